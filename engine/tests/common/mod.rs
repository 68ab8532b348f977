//! Shared fixtures for the engine integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use adslot_engine::config::BookingConfig;
use adslot_engine::directory::InMemoryDisplayDirectory;
use adslot_engine::notification::RecordingNotificationSender;
use adslot_engine::payment_gateway::MockPaymentGateway;
use adslot_engine::{
    AdDuration, AdvertiserId, BookingDependencies, BookingService, BookingWindow, CampaignId,
    Display, DisplayId, InMemoryReservationStore, Money, PaymentCallback, PaymentOutcome,
    Reservation, ReservationRequest, ReservationStore,
};
use adslot_testing::{init_test_tracing, test_epoch, ManualClock};
use chrono::Duration;
use std::sync::Arc;

/// A service over in-memory collaborators the test can inspect.
pub struct Harness {
    pub service: BookingService,
    pub store: Arc<InMemoryReservationStore>,
    pub directory: InMemoryDisplayDirectory,
    pub clock: ManualClock,
    pub payments: MockPaymentGateway,
    pub notifier: RecordingNotificationSender,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&BookingConfig::default())
    }

    pub fn with_config(config: &BookingConfig) -> Self {
        init_test_tracing();
        let store = Arc::new(InMemoryReservationStore::new());
        let directory = InMemoryDisplayDirectory::new();
        let clock = ManualClock::new(test_epoch());
        let payments = MockPaymentGateway::new();
        let notifier = RecordingNotificationSender::new();

        let service = BookingService::new(
            BookingDependencies {
                store: Arc::clone(&store) as Arc<dyn ReservationStore>,
                directory: Arc::new(directory.clone()),
                payments: Arc::new(payments.clone()),
                notifier: Arc::new(notifier.clone()),
                clock: Arc::new(clock.clone()),
            },
            config,
        );

        Self {
            service,
            store,
            directory,
            clock,
            payments,
            notifier,
        }
    }

    /// Register a display bookable at any time.
    pub fn display(&self, capacity_secs: u32, weekly_rate_cents: u64) -> Display {
        let display = Display::new(
            DisplayId::new(),
            AdDuration::from_secs(capacity_secs),
            Money::from_cents(weekly_rate_cents),
        );
        self.directory.insert(display.clone());
        display
    }

    /// Pending → Confirmed through the payment flow.
    pub async fn confirm(&self, reservation: &Reservation) -> Reservation {
        let paid = self.service.initiate_payment(reservation.id).await.unwrap();
        self.service
            .apply_payment_callback(PaymentCallback {
                payment_reference: paid.payment_reference.unwrap(),
                outcome: PaymentOutcome::Succeeded,
            })
            .await
            .unwrap()
            .reservation()
            .clone()
    }
}

/// Seven days from the test epoch (Monday 09:00 UTC) shifted by `offset`.
pub fn week_from(offset: Duration) -> BookingWindow {
    BookingWindow::starting_at(test_epoch() + offset, Duration::days(7)).unwrap()
}

pub fn request(display: &Display, window: BookingWindow, ad_duration_secs: u32) -> ReservationRequest {
    ReservationRequest {
        display_id: display.id,
        campaign_id: CampaignId::new(),
        advertiser_id: AdvertiserId::new(),
        window,
        ad_duration: AdDuration::from_secs(ad_duration_secs),
    }
}
