//! Admission under concurrency.
//!
//! Two layers keep the check-then-insert of an admission atomic per display:
//!
//! 1. [`DisplayLocks`], an arena of async mutexes keyed by display, serialises
//!    admissions on one display inside this process. Displays never share a
//!    lock, so admissions on different displays run in parallel.
//! 2. The store's per-display version: the availability read returns the
//!    version it saw and the insert only succeeds if the display is still at
//!    that version. This covers several engine processes sharing one store.
//!    A conflict is retried with backoff; once the retry budget is spent the
//!    request fails with [`BookingError::ReservationConflict`].
//!
//! Nothing inside the admission section talks to the payment provider.

use crate::availability::{Availability, AvailabilityChecker};
use crate::error::{BookingError, Result};
use crate::pricing::compute_price;
use crate::store::{ReservationStore, StoreError};
use crate::types::{Display, DisplayId, Money, Reservation, ReservationRequest};
use adslot_core::environment::Clock;
use adslot_runtime::{retry_with_predicate, RetryPolicy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;

/// A display's mutex and the number of leases on it.
#[derive(Debug, Default)]
struct LockEntry {
    mutex: Arc<tokio::sync::Mutex<()>>,
    users: usize,
}

type LockMap = HashMap<DisplayId, LockEntry>;

/// Arena of per-display admission locks.
///
/// Entries are created on first use and pruned when the last holder or
/// waiter lets go, including a waiter whose future is dropped before it got
/// the lock. The arena only holds displays with admissions in flight.
#[derive(Clone, Debug, Default)]
pub struct DisplayLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Counts one holder or waiter on a display's entry; prunes it when the last one goes.
#[derive(Debug)]
struct Lease {
    display_id: DisplayId,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = locks.get_mut(&self.display_id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                locks.remove(&self.display_id);
            }
        }
    }
}

/// Exclusive admission rights on one display. Released on drop.
#[derive(Debug)]
pub struct DisplayGuard {
    // Field order matters: the mutex is released before the lease prunes.
    _guard: OwnedMutexGuard<()>,
    lease: Lease,
}

impl DisplayLocks {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive admission rights on `display_id`.
    ///
    /// Cancel safe: dropping the returned future while it waits gives up the
    /// caller's claim on the entry.
    pub async fn acquire(&self, display_id: DisplayId) -> DisplayGuard {
        let (mutex, lease) = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = locks.entry(display_id).or_default();
            entry.users += 1;
            (
                Arc::clone(&entry.mutex),
                Lease {
                    display_id,
                    locks: Arc::clone(&self.locks),
                },
            )
        };

        let guard = mutex.lock_owned().await;

        DisplayGuard {
            _guard: guard,
            lease,
        }
    }

    /// Number of displays with a live lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether no display has a live lock entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DisplayGuard {
    /// Display this guard covers
    #[must_use]
    pub const fn display_id(&self) -> DisplayId {
        self.lease.display_id
    }
}

/// Serialises competing admissions per display and commits the winners.
#[derive(Clone)]
pub struct ConflictArbiter {
    store: Arc<dyn ReservationStore>,
    checker: AvailabilityChecker,
    locks: DisplayLocks,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ConflictArbiter {
    /// Creates a new `ConflictArbiter`
    #[must_use]
    pub fn new(
        store: Arc<dyn ReservationStore>,
        checker: AvailabilityChecker,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            checker,
            locks: DisplayLocks::new(),
            retry,
            clock,
        }
    }

    /// The lock arena, exposed for inspection
    #[must_use]
    pub const fn locks(&self) -> &DisplayLocks {
        &self.locks
    }

    /// Price, check and atomically commit a new Pending reservation.
    ///
    /// # Errors
    ///
    /// - Validation errors (bad ad duration, zero price) before any capacity check
    /// - [`BookingError::OutsideAvailabilityWindow`] / [`BookingError::InsufficientCapacity`]
    ///   as evaluated after every concurrent winner committed
    /// - [`BookingError::ReservationConflict`] if optimistic retries ran out
    #[tracing::instrument(skip(self, display_ref), fields(display_id = %display_ref.id, window = %request.window))]
    pub async fn try_reserve(&self, display_ref: &Display, request: ReservationRequest) -> Result<Reservation> {
        // `tracing` field macros shadow the identifier `display`, so the parameter is bound under another name.
        let display = display_ref;
        if request.display_id != display.id {
            return Err(BookingError::DisplayNotFound(request.display_id));
        }
        if request.ad_duration.is_zero() {
            return Err(BookingError::InvalidAdDuration);
        }
        let price = compute_price(display.weekly_rate, &request.window)?;

        let _guard = self.locks.acquire(display.id).await;
        let started = Instant::now();

        let result = retry_with_predicate(
            &self.retry,
            |attempt| self.admit_once(display, &request, price, attempt),
            BookingError::is_retryable,
        )
        .await;

        match result {
            Ok(reservation) => {
                crate::metrics::record_reservation_admitted(started.elapsed().as_secs_f64());
                tracing::info!(
                    reservation_id = %reservation.id,
                    price = %reservation.price,
                    "Reservation admitted"
                );
                Ok(reservation)
            },
            Err(BookingError::ReservationConflict { display_id, .. }) => {
                crate::metrics::record_admission_conflict();
                tracing::warn!(%display_id, "Admission contention unresolved");
                Err(BookingError::ReservationConflict {
                    display_id,
                    attempts: self.retry.max_retries + 1,
                })
            },
            Err(error) => Err(error),
        }
    }

    /// One read-evaluate-insert round.
    async fn admit_once(
        &self,
        display: &Display,
        request: &ReservationRequest,
        price: Money,
        attempt: usize,
    ) -> Result<Reservation> {
        let (version, availability) = self
            .checker
            .check_availability(self.store.as_ref(), display, request.window, request.ad_duration)
            .await?;

        if let Availability::Reject(reason) = availability {
            crate::metrics::record_admission_rejected(&reason);
            tracing::debug!(attempt, reason = reason.as_str(), "Admission rejected");
            return Err(reason.into_error(display, request.window));
        }

        let reservation = Reservation::pending(request, price, self.clock.now());
        match self.store.insert(reservation.clone(), version).await {
            Ok(_) => Ok(reservation),
            Err(StoreError::ConcurrencyConflict {
                display_id,
                expected,
                actual,
            }) => {
                tracing::debug!(attempt, %expected, %actual, "Display changed during admission");
                Err(BookingError::ReservationConflict {
                    display_id,
                    attempts: attempt + 1,
                })
            },
            Err(error) => Err(error.into()),
        }
    }
}
