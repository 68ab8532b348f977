//! Outbound notifications.
//!
//! Sent fire-and-forget after a transition commits. A failed delivery is
//! logged and counted; it never rolls the transition back.

use crate::types::{AdvertiserId, BookingWindow, DisplayId, Money, ReservationId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// A message for an advertiser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The booked window elapsed and the ad ran.
    ProofOfDisplay {
        /// Recipient
        advertiser_id: AdvertiserId,
        /// Completed reservation
        reservation_id: ReservationId,
        /// Display the ad ran on
        display_id: DisplayId,
        /// Window that elapsed
        window: BookingWindow,
    },
    /// A confirmed booking was denied and its payment refunded.
    BookingDenied {
        /// Recipient
        advertiser_id: AdvertiserId,
        /// Denied reservation
        reservation_id: ReservationId,
        /// Amount refunded
        refund: Money,
        /// Administrator's reason
        reason: String,
    },
}

impl Notification {
    /// The advertiser the notification goes to
    #[must_use]
    pub const fn recipient(&self) -> AdvertiserId {
        match self {
            Self::ProofOfDisplay { advertiser_id, .. } | Self::BookingDenied { advertiser_id, .. } => {
                *advertiser_id
            },
        }
    }

    /// Metric label
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProofOfDisplay { .. } => "proof_of_display",
            Self::BookingDenied { .. } => "booking_denied",
        }
    }
}

/// Delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification delivery failed: {0}")]
pub struct NotificationError(pub String);

/// Delivers notifications.
pub trait NotificationSender: Send + Sync {
    /// Deliver `notification`.
    ///
    /// # Errors
    ///
    /// Returns error if delivery fails
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + '_>>;
}

/// Writes notifications to the log. Default for development.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingNotificationSender;

impl NotificationSender for LoggingNotificationSender {
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                kind = notification.kind(),
                advertiser_id = %notification.recipient(),
                ?notification,
                "Notification sent"
            );
            Ok(())
        })
    }
}

/// Keeps every notification it is asked to send. For tests.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotificationSender {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotificationSender {
    /// Create a sender that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (nothing is recorded while failing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Notifications delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl NotificationSender for RecordingNotificationSender {
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + '_>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotificationError("recording sender set to fail".to_string()));
            }
            self.sent
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(notification);
            Ok(())
        })
    }
}
