//! Reservation persistence.
//!
//! The store is the only place reservations live. It offers exactly the
//! primitives the engine needs to stay correct under concurrency:
//!
//! - [`ReservationStore::holding_overlapping`] returns the holding reservations
//!   overlapping a window together with the display's current [`DisplayVersion`]
//! - [`ReservationStore::insert`] inserts a reservation only if the display is
//!   still at the version the caller read (optimistic admission)
//! - [`ReservationStore::transition`] is a single-row conditional status update
//!
//! Reporting goes through aggregate queries ([`ReservationStore::revenue`],
//! [`ReservationStore::count_by_status`], ...) that return totals, never rows.
//!
//! # Implementations
//!
//! - [`InMemoryReservationStore`]: tests and single-process deployments
//! - [`PostgresReservationStore`]: production, indexed on
//!   `(display_id, start_time, end_time, status)`
//!
//! The trait returns `Pin<Box<dyn Future>>` so it can be used as
//! `Arc<dyn ReservationStore>` inside effects.

use crate::error::BookingError;
use crate::types::{
    AdvertiserId, BookingWindow, DisplayId, Money, PaymentReference, Reservation, ReservationId,
    ReservationStatus,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryReservationStore;
pub use postgres::PostgresReservationStore;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Admission counter of a display.
///
/// Bumped by every successful insert on the display. Releases do not bump
/// it: an admission that read before a release only sees more load than
/// there is, which is conservative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayVersion(u64);

impl DisplayVersion {
    /// Version of a display that never had an admission.
    pub const INITIAL: Self = Self(0);

    /// Creates a version
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Raw value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The version after one more admission
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for DisplayVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another admission committed on the display since it was read.
    #[error("Concurrency conflict on display {display_id}: expected {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Contended display
        display_id: DisplayId,
        /// Version the caller read
        expected: DisplayVersion,
        /// Version found at commit time
        actual: DisplayVersion,
    },

    /// Conditional status update found a different status.
    #[error("Reservation {id} is {actual}, expected {expected}")]
    StatusMismatch {
        /// Reservation being transitioned
        id: ReservationId,
        /// Status the caller required
        expected: ReservationStatus,
        /// Status actually stored
        actual: ReservationStatus,
    },

    /// Payment reference already set on this reservation, or used by another one.
    #[error("Payment reference cannot be attached to reservation {0}")]
    PaymentReferenceTaken(ReservationId),

    /// A reservation with this id already exists.
    #[error("Reservation {0} already exists")]
    DuplicateReservation(ReservationId),

    /// Unknown reservation.
    #[error("Reservation not found: {0}")]
    NotFound(ReservationId),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// Row could not be mapped to a reservation.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for BookingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ConcurrencyConflict { display_id, .. } => Self::ReservationConflict {
                display_id,
                attempts: 1,
            },
            StoreError::StatusMismatch { id, actual, .. } => Self::ReservationAlreadyProcessed {
                reservation_id: id,
                status: actual,
                operation: "transition",
            },
            StoreError::PaymentReferenceTaken(reservation_id) => {
                Self::DuplicatePayment { reservation_id }
            },
            StoreError::NotFound(id) => Self::ReservationNotFound(id),
            StoreError::DuplicateReservation(_)
            | StoreError::Database(_)
            | StoreError::Serialization(_) => Self::Storage(error.to_string()),
        }
    }
}

/// Persistence for reservations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by every
/// request handler and the sweeper.
pub trait ReservationStore: Send + Sync {
    /// Holding (Pending/Confirmed) reservations of `display_id` overlapping
    /// `window`, and the display version they were read at.
    ///
    /// The version is read no later than the rows, so an insert made against
    /// it fails if any admission committed in between.
    fn holding_overlapping(
        &self,
        display_id: DisplayId,
        window: BookingWindow,
    ) -> StoreFuture<'_, (DisplayVersion, Vec<Reservation>)>;

    /// Insert a new reservation if its display is still at `expected_version`.
    ///
    /// Returns the display's new version.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConcurrencyConflict`] if another admission committed first.
    fn insert(
        &self,
        reservation: Reservation,
        expected_version: DisplayVersion,
    ) -> StoreFuture<'_, DisplayVersion>;

    /// Load a reservation.
    fn get(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// The reservation carrying `reference`, if any.
    fn find_by_payment_reference(
        &self,
        reference: PaymentReference,
    ) -> StoreFuture<'_, Option<Reservation>>;

    /// Every reservation of a display, oldest first.
    fn list_for_display(&self, display_id: DisplayId) -> StoreFuture<'_, Vec<Reservation>>;

    /// Atomically move `id` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// [`StoreError::StatusMismatch`] if the stored status is not `from`;
    /// nothing is written in that case.
    fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Reservation>;

    /// Record the payment reference of a Pending reservation without one.
    ///
    /// # Errors
    ///
    /// [`StoreError::PaymentReferenceTaken`] if a reference is already set or
    /// the reference belongs to another reservation, [`StoreError::StatusMismatch`]
    /// if the reservation is no longer Pending.
    fn attach_payment_reference(
        &self,
        id: ReservationId,
        reference: PaymentReference,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Reservation>;

    /// Up to `limit` Pending reservations created before `cutoff`, oldest first.
    fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Reservation>>;

    /// Up to `limit` Confirmed reservations whose window ended at or before `now`.
    fn confirmed_ended_before(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Reservation>>;

    /// Sum of prices and number of reservations whose status is in `statuses`.
    fn revenue(&self, statuses: Vec<ReservationStatus>) -> StoreFuture<'_, (Money, usize)>;

    /// Sum of prices per display over reservations whose status is in
    /// `statuses`. Displays without such reservations are absent.
    fn revenue_by_display(&self, statuses: Vec<ReservationStatus>) -> StoreFuture<'_, BTreeMap<DisplayId, Money>>;

    /// Confirmed reservations whose window contains `now`, counted per advertiser.
    fn active_by_advertiser(&self, now: DateTime<Utc>) -> StoreFuture<'_, BTreeMap<AdvertiserId, usize>>;

    /// Number of reservations per status. Statuses with none are absent.
    fn count_by_status(&self) -> StoreFuture<'_, BTreeMap<ReservationStatus, usize>>;

    /// Cheapest round trip to the backing storage.
    fn ping(&self) -> StoreFuture<'_, ()>;
}
