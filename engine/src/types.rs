//! Domain types for the reservation allocation engine.
//!
//! Value objects (ids, money, durations, booking windows), the `Display`
//! resource being booked, and the `Reservation` record the engine owns.

use crate::error::{BookingError, Result};
use crate::schedule::AvailabilitySchedule;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a display (the bookable screen)
    DisplayId
);
uuid_id!(
    /// Unique identifier for an advertising campaign
    CampaignId
);
uuid_id!(
    /// Unique identifier for an advertiser (the paying business)
    AdvertiserId
);
uuid_id!(
    /// Unique identifier for a reservation
    ReservationId
);

/// Opaque reference issued by the payment provider when a payment is authorized.
///
/// Doubles as the idempotency key for payment callbacks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentReference(String);

impl PaymentReference {
    /// Wrap a provider reference.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The raw provider reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Money amount in the currency's minor unit (cents)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole major units, `None` on overflow
    #[must_use]
    pub const fn checked_from_major(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two money amounts, clamping at `u64::MAX` cents
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Share of a display's rotation loop, in whole seconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdDuration(u32);

impl AdDuration {
    /// Zero seconds.
    pub const ZERO: Self = Self(0);

    /// Creates a duration of `secs` seconds
    #[must_use]
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// Whole seconds
    #[must_use]
    pub const fn as_secs(&self) -> u32 {
        self.0
    }

    /// Checks if the duration is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Sum of two durations, clamping at `u32::MAX`
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Difference of two durations, clamping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for AdDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Half-open booking interval `[start, end)` with `start < end`
///
/// Construction validates the ordering and caps the length at
/// [`BookingWindow::MAX_DAYS`], so every `BookingWindow` in the system is
/// well-formed and cheap to check against an availability schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct BookingWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawWindow> for BookingWindow {
    type Error = BookingError;

    fn try_from(raw: RawWindow) -> Result<Self> {
        Self::new(raw.start, raw.end)
    }
}

impl BookingWindow {
    /// Longest bookable window, in days.
    pub const MAX_DAYS: i64 = 731;

    /// Creates a window, rejecting `end <= start` and windows longer than
    /// [`Self::MAX_DAYS`].
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidWindow`] if the window is empty, inverted
    /// or too long.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(BookingError::InvalidWindow {
                reason: format!("start {start} must be before end {end}"),
            });
        }
        if end - start > Duration::days(Self::MAX_DAYS) {
            return Err(BookingError::InvalidWindow {
                reason: format!("window {start} to {end} is longer than {} days", Self::MAX_DAYS),
            });
        }
        Ok(Self { start, end })
    }

    /// Creates a window of `length` starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidWindow`] for a non-positive or too long length.
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Result<Self> {
        Self::new(start, start + length)
    }

    /// Inclusive start
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the window
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Interval overlap: `self.start < other.end && self.end > other.start`
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Whether `instant` lies in `[start, end)`
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl fmt::Display for BookingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// ============================================================================
// Display
// ============================================================================

/// A bookable display, owned by the external display directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Display {
    /// Display identifier
    pub id: DisplayId,
    /// Total rotation budget shared by concurrently running ads
    pub loop_capacity: AdDuration,
    /// Price for a seven day span
    pub weekly_rate: Money,
    /// Recurring schedule outside of which nothing may be booked
    #[serde(default)]
    pub availability: Option<AvailabilitySchedule>,
}

impl Display {
    /// A display bookable at any time.
    #[must_use]
    pub const fn new(id: DisplayId, loop_capacity: AdDuration, weekly_rate: Money) -> Self {
        Self {
            id,
            loop_capacity,
            weekly_rate,
            availability: None,
        }
    }

    /// Restrict bookings to a recurring schedule.
    #[must_use]
    pub fn with_availability(mut self, schedule: AvailabilitySchedule) -> Self {
        self.availability = Some(schedule);
        self
    }
}

// ============================================================================
// Reservation
// ============================================================================

/// Reservation lifecycle status
///
/// ```text
/// Pending ──► Confirmed ──► Completed
///    │            │
///    │            └──► Denied
///    ├──► Cancelled
///    └──► Expired
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Admitted, awaiting payment
    Pending,
    /// Payment captured
    Confirmed,
    /// Administratively denied after confirmation (refunded)
    Denied,
    /// Withdrawn by the advertiser or payment failed
    Cancelled,
    /// Unpaid past the grace period
    Expired,
    /// Display window fully elapsed
    Completed,
}

impl ReservationStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Confirmed,
        Self::Denied,
        Self::Cancelled,
        Self::Expired,
        Self::Completed,
    ];

    /// Statuses whose reservations hold loop capacity.
    pub const HOLDING: [Self; 2] = [Self::Pending, Self::Confirmed];

    /// No transition leaves a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Denied | Self::Cancelled | Self::Expired | Self::Completed
        )
    }

    /// Whether a reservation in this status counts against loop capacity.
    #[must_use]
    pub const fn holds_capacity(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Stable lowercase name, used in storage and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| BookingError::Storage(format!("unknown reservation status '{s}'")))
    }
}

/// What a caller asks the engine to book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    /// Display to book
    pub display_id: DisplayId,
    /// Campaign the booking belongs to
    pub campaign_id: CampaignId,
    /// Advertiser paying for it
    pub advertiser_id: AdvertiserId,
    /// Requested window
    pub window: BookingWindow,
    /// Share of the display loop the ad occupies
    pub ad_duration: AdDuration,
}

/// A claim on a display for a window and a share of its loop capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identifier
    pub id: ReservationId,
    /// Display being booked
    pub display_id: DisplayId,
    /// Owning campaign
    pub campaign_id: CampaignId,
    /// Paying advertiser
    pub advertiser_id: AdvertiserId,
    /// Booked window
    pub window: BookingWindow,
    /// Loop share held while the reservation is Pending or Confirmed
    pub ad_duration: AdDuration,
    /// Current lifecycle status
    pub status: ReservationStatus,
    /// Price computed at admission
    pub price: Money,
    /// When the reservation was admitted
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// Set once, when payment is initiated
    pub payment_reference: Option<PaymentReference>,
}

impl Reservation {
    /// Creates a new Pending reservation for an admitted request.
    #[must_use]
    pub fn pending(request: &ReservationRequest, price: Money, now: DateTime<Utc>) -> Self {
        Self {
            id: ReservationId::new(),
            display_id: request.display_id,
            campaign_id: request.campaign_id,
            advertiser_id: request.advertiser_id,
            window: request.window,
            ad_duration: request.ad_duration,
            status: ReservationStatus::Pending,
            price,
            created_at: now,
            updated_at: now,
            payment_reference: None,
        }
    }

    /// Whether this reservation counts against capacity for `window`.
    #[must_use]
    pub fn holds_capacity_during(&self, window: &BookingWindow) -> bool {
        self.status.holds_capacity() && self.window.overlaps(window)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_window_rejects_empty_and_inverted() {
        assert!(BookingWindow::new(at(6, 9), at(6, 9)).is_err());
        assert!(BookingWindow::new(at(7, 9), at(6, 9)).is_err());
        assert!(BookingWindow::new(at(6, 9), at(6, 10)).is_ok());
    }

    #[test]
    fn test_window_length_is_capped() {
        let start = at(6, 9);
        let longest = BookingWindow::starting_at(start, Duration::days(BookingWindow::MAX_DAYS)).unwrap();
        assert_eq!(longest.duration(), Duration::days(BookingWindow::MAX_DAYS));

        let too_long = BookingWindow::starting_at(
            start,
            Duration::days(BookingWindow::MAX_DAYS) + Duration::seconds(1),
        );
        assert!(matches!(too_long, Err(BookingError::InvalidWindow { .. })));

        // A multi-century window never reaches the availability walk.
        let centuries = BookingWindow::starting_at(start, Duration::days(365 * 300));
        assert!(centuries.is_err());
    }

    #[test]
    fn test_window_overlap_is_half_open() {
        let monday = BookingWindow::new(at(6, 0), at(7, 0)).unwrap();
        let tuesday = BookingWindow::new(at(7, 0), at(8, 0)).unwrap();
        let straddle = BookingWindow::new(at(6, 12), at(7, 12)).unwrap();

        assert!(!monday.overlaps(&tuesday));
        assert!(!tuesday.overlaps(&monday));
        assert!(monday.overlaps(&straddle));
        assert!(straddle.overlaps(&tuesday));
        assert!(monday.contains(at(6, 0)));
        assert!(!monday.contains(at(7, 0)));
    }

    #[test]
    fn test_window_deserialize_validates() {
        let ok: std::result::Result<BookingWindow, _> = serde_json::from_str(
            r#"{"start":"2025-01-06T09:00:00Z","end":"2025-01-13T09:00:00Z"}"#,
        );
        assert_eq!(ok.unwrap().duration(), Duration::days(7));

        let inverted: std::result::Result<BookingWindow, _> = serde_json::from_str(
            r#"{"start":"2025-01-13T09:00:00Z","end":"2025-01-06T09:00:00Z"}"#,
        );
        assert!(inverted.is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ReservationStatus::ALL {
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), status);
        }
        assert!("archived".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_terminal_and_holding_partition() {
        for status in ReservationStatus::ALL {
            assert_ne!(status.is_terminal(), status.holds_capacity());
        }
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(20_000).to_string(), "$200.00");
        assert_eq!(Money::from_cents(1_405).to_string(), "$14.05");
        assert_eq!(Money::checked_from_major(100), Some(Money::from_cents(10_000)));
        assert_eq!(Money::checked_from_major(u64::MAX), None);
    }
}
