//! Read-side reporting over reservations.
//!
//! Every figure comes from an aggregate query in the store; no reservation
//! rows are loaded. Queries read a snapshot at call time; concurrent writes
//! may or may not be reflected. Nothing here writes.

use crate::error::Result;
use crate::store::ReservationStore;
use crate::types::{AdvertiserId, DisplayId, Money, ReservationStatus};
use adslot_core::environment::Clock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Statuses whose price counts as platform revenue.
const REVENUE_STATUSES: [ReservationStatus; 2] = [ReservationStatus::Confirmed, ReservationStatus::Completed];

/// Platform revenue totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RevenueReport {
    /// Sum over Confirmed and Completed reservations
    pub total: Money,
    /// Number of reservations counted
    pub reservations: usize,
}

/// Computes campaign and revenue figures.
#[derive(Clone)]
pub struct CampaignAggregator {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
}

impl CampaignAggregator {
    /// Creates a new `CampaignAggregator`
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Confirmed reservations running right now, counted per advertiser.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn active_campaigns_by_advertiser(&self) -> Result<BTreeMap<AdvertiserId, usize>> {
        Ok(self.store.active_by_advertiser(self.clock.now()).await?)
    }

    /// Revenue across the platform.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn platform_revenue(&self) -> Result<RevenueReport> {
        let (total, reservations) = self.store.revenue(REVENUE_STATUSES.to_vec()).await?;
        Ok(RevenueReport { total, reservations })
    }

    /// Revenue per display.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn revenue_by_display(&self) -> Result<BTreeMap<DisplayId, Money>> {
        Ok(self.store.revenue_by_display(REVENUE_STATUSES.to_vec()).await?)
    }

    /// Number of reservations in each status, including zeros.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn status_counts(&self) -> Result<BTreeMap<ReservationStatus, usize>> {
        let mut counts: BTreeMap<ReservationStatus, usize> =
            ReservationStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        counts.extend(self.store.count_by_status().await?);
        Ok(counts)
    }
}
