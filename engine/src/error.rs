//! Booking error taxonomy.
//!
//! Every failure the engine reports is a [`BookingError`]. Variants are grouped
//! by [`ErrorKind`] so transports can map a whole class at once (HTTP status,
//! retry hints, log level) without matching every variant.

use crate::types::{BookingWindow, DisplayId, ReservationId, ReservationStatus};
use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, BookingError>;

/// Coarse classification of a [`BookingError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, rejected before any capacity check
    Validation,
    /// Availability or loop capacity rejected the request
    Capacity,
    /// Contention could not be resolved within the retry budget
    Conflict,
    /// Transition attempted from a non-matching status
    State,
    /// Unknown reservation, display or payment reference
    NotFound,
    /// The payment provider failed
    Payment,
    /// The reservation store failed
    Storage,
}

impl ErrorKind {
    /// Stable lowercase name for logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Capacity => "capacity",
            Self::Conflict => "conflict",
            Self::State => "state",
            Self::NotFound => "not_found",
            Self::Payment => "payment",
            Self::Storage => "storage",
        }
    }
}

/// Errors produced by booking operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Window is empty, inverted or otherwise malformed
    #[error("Invalid booking window: {reason}")]
    InvalidWindow {
        /// What is wrong with the window
        reason: String,
    },

    /// Ad duration must be positive
    #[error("Ad duration must be at least one second")]
    InvalidAdDuration,

    /// Availability schedule definition is malformed
    #[error("Invalid availability schedule: {reason}")]
    InvalidSchedule {
        /// What is wrong with the schedule
        reason: String,
    },

    /// Price computed to zero or less
    #[error("Invalid pricing: {reason}")]
    InvalidPricing {
        /// Why the price was rejected
        reason: String,
    },

    /// Window is not fully inside the display's availability schedule
    #[error("Window {window} is outside the availability schedule of display {display_id}")]
    OutsideAvailabilityWindow {
        /// Display being booked
        display_id: DisplayId,
        /// Requested window
        window: BookingWindow,
    },

    /// Not enough loop capacity left for the window
    #[error(
        "Insufficient capacity on display {display_id}: requested {requested}s, \
         committed {committed}s of {capacity}s"
    )]
    InsufficientCapacity {
        /// Display being booked
        display_id: DisplayId,
        /// Seconds requested
        requested: u32,
        /// Seconds already committed over the window
        committed: u32,
        /// Display loop capacity in seconds
        capacity: u32,
    },

    /// Concurrent admissions kept invalidating each other
    #[error("Reservation conflict on display {display_id} after {attempts} attempts, retry the request")]
    ReservationConflict {
        /// Contended display
        display_id: DisplayId,
        /// Attempts made before giving up
        attempts: usize,
    },

    /// Transition attempted against a non-matching or terminal status
    #[error("Reservation {reservation_id} is {status}, cannot {operation}")]
    ReservationAlreadyProcessed {
        /// Reservation the transition targeted
        reservation_id: ReservationId,
        /// Status found when the transition was attempted
        status: ReservationStatus,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Payment was already initiated for the reservation
    #[error("Payment already initiated for reservation {reservation_id}")]
    DuplicatePayment {
        /// Reservation that already has a payment reference
        reservation_id: ReservationId,
    },

    /// Administrative denial after the window started
    #[error("Reservation {reservation_id} window has already started, denial is no longer possible")]
    DenialWindowClosed {
        /// Reservation that was to be denied
        reservation_id: ReservationId,
    },

    /// Completion requested before the window ended
    #[error("Reservation {reservation_id} window has not ended yet")]
    WindowStillOpen {
        /// Reservation that was to be completed
        reservation_id: ReservationId,
    },

    /// Expiry requested before the grace period elapsed
    #[error("Reservation {reservation_id} is still within its payment grace period")]
    GracePeriodNotElapsed {
        /// Reservation that was to be expired
        reservation_id: ReservationId,
    },

    /// Unknown reservation
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// Unknown display
    #[error("Display not found: {0}")]
    DisplayNotFound(DisplayId),

    /// No reservation carries this payment reference
    #[error("No reservation for payment reference {0}")]
    PaymentReferenceNotFound(String),

    /// Payment provider failure
    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    /// Store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BookingError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidWindow { .. }
            | Self::InvalidAdDuration
            | Self::InvalidSchedule { .. }
            | Self::InvalidPricing { .. } => ErrorKind::Validation,
            Self::OutsideAvailabilityWindow { .. } | Self::InsufficientCapacity { .. } => {
                ErrorKind::Capacity
            },
            Self::ReservationConflict { .. } => ErrorKind::Conflict,
            Self::ReservationAlreadyProcessed { .. }
            | Self::DuplicatePayment { .. }
            | Self::DenialWindowClosed { .. }
            | Self::WindowStillOpen { .. }
            | Self::GracePeriodNotElapsed { .. } => ErrorKind::State,
            Self::ReservationNotFound(_)
            | Self::DisplayNotFound(_)
            | Self::PaymentReferenceNotFound(_) => ErrorKind::NotFound,
            Self::PaymentGateway(_) => ErrorKind::Payment,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the caller should retry the whole request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ReservationConflict { .. })
    }

    /// Short machine-readable code, used in API error bodies and metric labels.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidWindow { .. } => "invalid_window",
            Self::InvalidAdDuration => "invalid_ad_duration",
            Self::InvalidSchedule { .. } => "invalid_schedule",
            Self::InvalidPricing { .. } => "invalid_pricing",
            Self::OutsideAvailabilityWindow { .. } => "outside_availability_window",
            Self::InsufficientCapacity { .. } => "insufficient_capacity",
            Self::ReservationConflict { .. } => "reservation_conflict",
            Self::ReservationAlreadyProcessed { .. } => "reservation_already_processed",
            Self::DuplicatePayment { .. } => "duplicate_payment",
            Self::DenialWindowClosed { .. } => "denial_window_closed",
            Self::WindowStillOpen { .. } => "window_still_open",
            Self::GracePeriodNotElapsed { .. } => "grace_period_not_elapsed",
            Self::ReservationNotFound(_) => "reservation_not_found",
            Self::DisplayNotFound(_) => "display_not_found",
            Self::PaymentReferenceNotFound(_) => "payment_reference_not_found",
            Self::PaymentGateway(_) => "payment_gateway",
            Self::Storage(_) => "storage",
        }
    }
}
