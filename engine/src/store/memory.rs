//! In-memory reservation store.
//!
//! Every operation runs under one `tokio::sync::RwLock`, so reads are
//! consistent snapshots and writes are linearizable. Suitable for tests and
//! single-process deployments; nothing survives a restart.

use super::{DisplayVersion, ReservationStore, StoreError, StoreFuture};
use crate::types::{
    AdvertiserId, BookingWindow, DisplayId, Money, PaymentReference, Reservation, ReservationId,
    ReservationStatus,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct DisplayRecord {
    version: DisplayVersion,
    reservations: Vec<ReservationId>,
}

#[derive(Debug, Default)]
struct Inner {
    reservations: HashMap<ReservationId, Reservation>,
    displays: HashMap<DisplayId, DisplayRecord>,
    payment_references: HashMap<PaymentReference, ReservationId>,
}

impl Inner {
    fn version_of(&self, display_id: DisplayId) -> DisplayVersion {
        self.displays
            .get(&display_id)
            .map_or(DisplayVersion::INITIAL, |d| d.version)
    }

    fn reservations_of(&self, display_id: DisplayId) -> impl Iterator<Item = &Reservation> {
        self.displays
            .get(&display_id)
            .into_iter()
            .flat_map(|d| d.reservations.iter())
            .filter_map(|id| self.reservations.get(id))
    }
}

/// In-memory [`ReservationStore`].
///
/// Cloning is cheap; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReservationStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryReservationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reservations, in any status.
    pub async fn len(&self) -> usize {
        self.inner.read().await.reservations.len()
    }

    /// Whether the store holds no reservations.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn oldest_first(mut reservations: Vec<Reservation>) -> Vec<Reservation> {
    reservations.sort_by_key(|r| (r.created_at, r.id));
    reservations
}

impl ReservationStore for InMemoryReservationStore {
    fn holding_overlapping(
        &self,
        display_id: DisplayId,
        window: BookingWindow,
    ) -> StoreFuture<'_, (DisplayVersion, Vec<Reservation>)> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let holding = inner
                .reservations_of(display_id)
                .filter(|r| r.holds_capacity_during(&window))
                .cloned()
                .collect();
            Ok((inner.version_of(display_id), holding))
        })
    }

    fn insert(
        &self,
        reservation: Reservation,
        expected_version: DisplayVersion,
    ) -> StoreFuture<'_, DisplayVersion> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;

            let actual = inner.version_of(reservation.display_id);
            if actual != expected_version {
                return Err(StoreError::ConcurrencyConflict {
                    display_id: reservation.display_id,
                    expected: expected_version,
                    actual,
                });
            }
            if inner.reservations.contains_key(&reservation.id) {
                return Err(StoreError::DuplicateReservation(reservation.id));
            }

            let record = inner.displays.entry(reservation.display_id).or_default();
            record.version = record.version.next();
            record.reservations.push(reservation.id);
            let version = record.version;

            if let Some(reference) = &reservation.payment_reference {
                inner
                    .payment_references
                    .insert(reference.clone(), reservation.id);
            }
            inner.reservations.insert(reservation.id, reservation);

            Ok(version)
        })
    }

    fn get(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { Ok(self.inner.read().await.reservations.get(&id).cloned()) })
    }

    fn find_by_payment_reference(
        &self,
        reference: PaymentReference,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(inner
                .payment_references
                .get(&reference)
                .and_then(|id| inner.reservations.get(id))
                .cloned())
        })
    }

    fn list_for_display(&self, display_id: DisplayId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(oldest_first(inner.reservations_of(display_id).cloned().collect()))
        })
    }

    fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let reservation = inner
                .reservations
                .get_mut(&id)
                .ok_or(StoreError::NotFound(id))?;

            if reservation.status != from {
                return Err(StoreError::StatusMismatch {
                    id,
                    expected: from,
                    actual: reservation.status,
                });
            }

            reservation.status = to;
            reservation.updated_at = at;
            Ok(reservation.clone())
        })
    }

    fn attach_payment_reference(
        &self,
        id: ReservationId,
        reference: PaymentReference,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;

            if inner.payment_references.contains_key(&reference) {
                return Err(StoreError::PaymentReferenceTaken(id));
            }

            let reservation = inner
                .reservations
                .get_mut(&id)
                .ok_or(StoreError::NotFound(id))?;

            if reservation.status != ReservationStatus::Pending {
                return Err(StoreError::StatusMismatch {
                    id,
                    expected: ReservationStatus::Pending,
                    actual: reservation.status,
                });
            }
            if reservation.payment_reference.is_some() {
                return Err(StoreError::PaymentReferenceTaken(id));
            }

            reservation.payment_reference = Some(reference.clone());
            reservation.updated_at = at;
            let updated = reservation.clone();
            inner.payment_references.insert(reference, id);
            Ok(updated)
        })
    }

    fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let mut due = oldest_first(
                inner
                    .reservations
                    .values()
                    .filter(|r| r.status == ReservationStatus::Pending && r.created_at < cutoff)
                    .cloned()
                    .collect(),
            );
            due.truncate(limit);
            Ok(due)
        })
    }

    fn confirmed_ended_before(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let mut due: Vec<Reservation> = inner
                .reservations
                .values()
                .filter(|r| r.status == ReservationStatus::Confirmed && r.window.end() <= now)
                .cloned()
                .collect();
            due.sort_by_key(|r| (r.window.end(), r.id));
            due.truncate(limit);
            Ok(due)
        })
    }

    fn revenue(&self, statuses: Vec<ReservationStatus>) -> StoreFuture<'_, (Money, usize)> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(inner
                .reservations
                .values()
                .filter(|r| statuses.contains(&r.status))
                .fold((Money::ZERO, 0_usize), |(total, count), r| {
                    (total.saturating_add(r.price), count + 1)
                }))
        })
    }

    fn revenue_by_display(&self, statuses: Vec<ReservationStatus>) -> StoreFuture<'_, BTreeMap<DisplayId, Money>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(inner
                .reservations
                .values()
                .filter(|r| statuses.contains(&r.status))
                .fold(BTreeMap::<DisplayId, Money>::new(), |mut revenue, r| {
                    let entry = revenue.entry(r.display_id).or_default();
                    *entry = entry.saturating_add(r.price);
                    revenue
                }))
        })
    }

    fn active_by_advertiser(&self, now: DateTime<Utc>) -> StoreFuture<'_, BTreeMap<AdvertiserId, usize>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(inner
                .reservations
                .values()
                .filter(|r| r.status == ReservationStatus::Confirmed && r.window.contains(now))
                .fold(BTreeMap::<AdvertiserId, usize>::new(), |mut counts, r| {
                    *counts.entry(r.advertiser_id).or_insert(0) += 1;
                    counts
                }))
        })
    }

    fn count_by_status(&self) -> StoreFuture<'_, BTreeMap<ReservationStatus, usize>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(inner
                .reservations
                .values()
                .fold(BTreeMap::<ReservationStatus, usize>::new(), |mut counts, r| {
                    *counts.entry(r.status).or_insert(0) += 1;
                    counts
                }))
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
