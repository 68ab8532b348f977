//! Admission check: may this window on this display be granted?
//!
//! 1. The window must lie inside the display's availability schedule.
//! 2. The holding reservations overlapping the window are loaded.
//! 3. Their committed loop time plus the requested ad duration must fit the
//!    display's loop capacity.
//!
//! The check on its own is not safe under concurrency; the
//! [`ConflictArbiter`](crate::arbiter::ConflictArbiter) runs it inside its
//! per-display atomic section.

use crate::capacity::{CapacityModel, CapacityPolicy, CapacityReport};
use crate::error::{BookingError, Result};
use crate::store::{DisplayVersion, ReservationStore};
use crate::types::{AdDuration, BookingWindow, Display, Reservation};
use serde::Serialize;

/// Why a request was not admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Window leaves the display's schedule
    OutsideAvailabilityWindow,
    /// Loop capacity exhausted over the window
    InsufficientCapacity {
        /// Requested loop share
        requested: AdDuration,
        /// Already committed
        committed: AdDuration,
        /// Display loop capacity
        capacity: AdDuration,
    },
}

impl RejectReason {
    /// Metric label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OutsideAvailabilityWindow => "outside_availability_window",
            Self::InsufficientCapacity { .. } => "insufficient_capacity",
        }
    }

    /// The domain error for this rejection.
    #[must_use]
    pub fn into_error(self, display: &Display, window: BookingWindow) -> BookingError {
        match self {
            Self::OutsideAvailabilityWindow => BookingError::OutsideAvailabilityWindow {
                display_id: display.id,
                window,
            },
            Self::InsufficientCapacity {
                requested,
                committed,
                capacity,
            } => BookingError::InsufficientCapacity {
                display_id: display.id,
                requested: requested.as_secs(),
                committed: committed.as_secs(),
                capacity: capacity.as_secs(),
            },
        }
    }
}

/// Outcome of an availability check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Availability {
    /// The request fits; `report` is the usage before admitting it.
    Accept {
        /// Capacity usage over the window, excluding the request
        report: CapacityReport,
    },
    /// The request does not fit.
    Reject(RejectReason),
}

impl Availability {
    /// Whether the request was accepted
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

/// Evaluates requests against a display's schedule and capacity.
#[derive(Clone, Copy, Debug, Default)]
pub struct AvailabilityChecker {
    policy: CapacityPolicy,
}

impl AvailabilityChecker {
    /// Checker accounting capacity under `policy`.
    #[must_use]
    pub const fn new(policy: CapacityPolicy) -> Self {
        Self { policy }
    }

    /// Capacity policy in use
    #[must_use]
    pub const fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    /// The capacity model of `display` under this checker's policy.
    #[must_use]
    pub const fn model_for(&self, display: &Display) -> CapacityModel {
        CapacityModel::new(display.loop_capacity, self.policy)
    }

    /// Decide a request given the reservations currently holding capacity.
    ///
    /// Pure: `holding` may be any superset of the display's holding
    /// reservations overlapping `window`.
    #[must_use]
    pub fn evaluate(
        &self,
        display: &Display,
        window: &BookingWindow,
        ad_duration: AdDuration,
        holding: &[Reservation],
    ) -> Availability {
        if let Some(schedule) = &display.availability {
            if !schedule.contains(window) {
                return Availability::Reject(RejectReason::OutsideAvailabilityWindow);
            }
        }

        let report = self.model_for(display).report(window, holding);
        if report.fits(ad_duration) {
            Availability::Accept { report }
        } else {
            Availability::Reject(RejectReason::InsufficientCapacity {
                requested: ad_duration,
                committed: report.committed,
                capacity: report.capacity,
            })
        }
    }

    /// Load the holding reservations from `store` and decide a request.
    ///
    /// Returns the display version the decision was based on, for an
    /// optimistic insert.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidAdDuration`] for a zero ad duration, or a
    /// storage error.
    pub async fn check_availability(
        &self,
        store: &dyn ReservationStore,
        display: &Display,
        window: BookingWindow,
        ad_duration: AdDuration,
    ) -> Result<(DisplayVersion, Availability)> {
        if ad_duration.is_zero() {
            return Err(BookingError::InvalidAdDuration);
        }

        let (version, holding) = store.holding_overlapping(display.id, window).await?;
        let availability = self.evaluate(display, &window, ad_duration, &holding);

        let display_id = display.id;
        tracing::debug!(
            %display_id,
            %window,
            %ad_duration,
            %version,
            holding = holding.len(),
            accepted = availability.is_accept(),
            "Availability checked"
        );

        Ok((version, availability))
    }

    /// Capacity usage of `display` over `window`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn capacity_report(
        &self,
        store: &dyn ReservationStore,
        display: &Display,
        window: BookingWindow,
    ) -> Result<CapacityReport> {
        let (_, holding) = store.holding_overlapping(display.id, window).await?;
        Ok(self.model_for(display).report(&window, &holding))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::schedule::{AvailabilitySchedule, WeeklySlot};
    use crate::store::InMemoryReservationStore;
    use crate::types::{
        AdvertiserId, CampaignId, DisplayId, Money, ReservationRequest, ReservationStatus,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc, Weekday};

    fn monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
    }

    fn display(capacity: u32) -> Display {
        Display::new(DisplayId::new(), AdDuration::from_secs(capacity), Money::from_cents(10_000))
    }

    fn week() -> BookingWindow {
        BookingWindow::starting_at(monday(), Duration::days(7)).unwrap()
    }

    fn holding(display: &Display, secs: u32, status: ReservationStatus) -> Reservation {
        let request = ReservationRequest {
            display_id: display.id,
            campaign_id: CampaignId::new(),
            advertiser_id: AdvertiserId::new(),
            window: week(),
            ad_duration: AdDuration::from_secs(secs),
        };
        let mut reservation = Reservation::pending(&request, Money::from_cents(10_000), monday());
        reservation.status = status;
        reservation
    }

    #[test]
    fn test_accepts_when_it_fits() {
        let display = display(30);
        let existing = vec![holding(&display, 20, ReservationStatus::Confirmed)];
        let checker = AvailabilityChecker::default();

        let decision = checker.evaluate(&display, &week(), AdDuration::from_secs(10), &existing);
        assert!(decision.is_accept());
    }

    #[test]
    fn test_rejects_over_capacity() {
        let display = display(30);
        let existing = vec![holding(&display, 20, ReservationStatus::Pending)];
        let checker = AvailabilityChecker::default();

        let decision = checker.evaluate(&display, &week(), AdDuration::from_secs(15), &existing);
        assert_eq!(
            decision,
            Availability::Reject(RejectReason::InsufficientCapacity {
                requested: AdDuration::from_secs(15),
                committed: AdDuration::from_secs(20),
                capacity: AdDuration::from_secs(30),
            })
        );
    }

    #[test]
    fn test_released_reservations_do_not_count() {
        let display = display(30);
        let existing = vec![
            holding(&display, 20, ReservationStatus::Denied),
            holding(&display, 20, ReservationStatus::Expired),
        ];
        let checker = AvailabilityChecker::default();

        let decision = checker.evaluate(&display, &week(), AdDuration::from_secs(25), &existing);
        assert!(decision.is_accept());
    }

    #[test]
    fn test_schedule_checked_before_capacity() {
        let weekdays_only = AvailabilitySchedule::new(
            vec![],
            vec![WeeklySlot::all_day(Weekday::Mon), WeeklySlot::all_day(Weekday::Tue)],
        )
        .unwrap();
        let display = display(30).with_availability(weekdays_only);
        let checker = AvailabilityChecker::default();

        let decision = checker.evaluate(&display, &week(), AdDuration::from_secs(5), &[]);
        assert_eq!(decision, Availability::Reject(RejectReason::OutsideAvailabilityWindow));
    }

    #[tokio::test]
    async fn test_check_against_store() {
        let store = InMemoryReservationStore::new();
        let display = display(30);
        let checker = AvailabilityChecker::default();

        let (version, decision) = checker
            .check_availability(&store, &display, week(), AdDuration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(version, DisplayVersion::INITIAL);
        assert!(decision.is_accept());

        let zero = checker
            .check_availability(&store, &display, week(), AdDuration::ZERO)
            .await;
        assert_eq!(zero, Err(BookingError::InvalidAdDuration));
    }
}
