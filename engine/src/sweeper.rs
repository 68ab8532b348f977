//! Background sweeper.
//!
//! Each pass runs two bounded phases:
//!
//! 1. expire Pending reservations older than the grace period, releasing their capacity
//! 2. complete Confirmed reservations whose window is over
//!
//! Items are independent: one failing item is logged and counted, the rest
//! of the batch goes on. An item another actor moved first (a payment
//! callback, another sweeper) is skipped, not failed.

use crate::error::BookingError;
use crate::lifecycle::LifecycleAction;
use crate::service::BookingService;
use crate::types::Reservation;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Sweeper settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between passes
    pub interval: Duration,
    /// Maximum reservations per phase
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

/// Outcome of one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Pending reservations expired
    pub expired: usize,
    /// Confirmed reservations completed
    pub completed: usize,
    /// Items someone else had already moved
    pub skipped: usize,
    /// Items that errored
    pub failed: usize,
}

impl SweepReport {
    /// Whether the pass touched nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.expired + self.completed + self.skipped + self.failed == 0
    }
}

enum ItemOutcome {
    Applied,
    Skipped,
    Failed,
}

/// Periodic expiry and completion of reservations.
#[derive(Clone)]
pub struct ExpirySweeper {
    service: BookingService,
    config: SweeperConfig,
}

impl ExpirySweeper {
    /// Creates a new `ExpirySweeper`
    #[must_use]
    pub const fn new(service: BookingService, config: SweeperConfig) -> Self {
        Self { service, config }
    }

    /// Run one pass.
    ///
    /// Store errors while listing a phase count as one failure for that
    /// phase; the other phase still runs.
    pub async fn sweep_once(&self) -> SweepReport {
        let started = Instant::now();
        let now = self.service.clock().now();
        let grace_period = self.service.grace_period();
        let mut report = SweepReport::default();

        match self
            .service
            .store()
            .pending_created_before(now - grace_period, self.config.batch_size)
            .await
        {
            Ok(stale) => {
                for reservation in stale {
                    match self
                        .sweep_item(reservation, LifecycleAction::Expire { grace_period })
                        .await
                    {
                        ItemOutcome::Applied => report.expired += 1,
                        ItemOutcome::Skipped => report.skipped += 1,
                        ItemOutcome::Failed => report.failed += 1,
                    }
                }
            },
            Err(error) => {
                error!(%error, "Failed to list stale pending reservations");
                report.failed += 1;
            },
        }

        match self
            .service
            .store()
            .confirmed_ended_before(now, self.config.batch_size)
            .await
        {
            Ok(finished) => {
                for reservation in finished {
                    match self.sweep_item(reservation, LifecycleAction::Complete).await {
                        ItemOutcome::Applied => report.completed += 1,
                        ItemOutcome::Skipped => report.skipped += 1,
                        ItemOutcome::Failed => report.failed += 1,
                    }
                }
            },
            Err(error) => {
                error!(%error, "Failed to list finished confirmed reservations");
                report.failed += 1;
            },
        }

        crate::metrics::record_sweep(
            report.expired,
            report.completed,
            report.skipped,
            report.failed,
            started.elapsed().as_secs_f64(),
        );
        if report.is_empty() {
            debug!("Sweep found nothing to do");
        } else {
            info!(
                expired = report.expired,
                completed = report.completed,
                skipped = report.skipped,
                failed = report.failed,
                "Sweep finished"
            );
        }
        report
    }

    async fn sweep_item(&self, reservation: Reservation, action: LifecycleAction) -> ItemOutcome {
        let reservation_id = reservation.id;
        match self.service.apply(reservation, action).await {
            Ok(_) => ItemOutcome::Applied,
            Err(
                error @ (BookingError::ReservationAlreadyProcessed { .. }
                | BookingError::GracePeriodNotElapsed { .. }
                | BookingError::WindowStillOpen { .. }),
            ) => {
                if let BookingError::ReservationAlreadyProcessed { operation, .. } = &error {
                    crate::metrics::record_transition_dropped(*operation);
                }
                debug!(%reservation_id, %error, "Sweeper skipped reservation");
                ItemOutcome::Skipped
            },
            Err(error) => {
                warn!(%reservation_id, %error, "Sweeper failed on reservation");
                ItemOutcome::Failed
            },
        }
    }

    /// Sweep every `interval` until `shutdown` fires.
    ///
    /// The first pass runs immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Expiry sweeper started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Expiry sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        info!("Expiry sweeper stopped");
    }

    /// Spawn [`run`](Self::run) as a background task.
    #[must_use]
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::BookingConfig;
    use crate::directory::InMemoryDisplayDirectory;
    use crate::notification::RecordingNotificationSender;
    use crate::payment_gateway::MockPaymentGateway;
    use crate::service::{BookingDependencies, PaymentCallback, PaymentOutcome};
    use crate::store::InMemoryReservationStore;
    use crate::types::{
        AdDuration, AdvertiserId, BookingWindow, CampaignId, Display, DisplayId, Money,
        ReservationRequest, ReservationStatus,
    };
    use adslot_testing::{test_epoch, ManualClock};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    fn setup() -> (BookingService, Display, ManualClock) {
        let display = Display::new(DisplayId::new(), AdDuration::from_secs(30), Money::from_cents(10_000));
        let clock = ManualClock::new(test_epoch());
        let service = BookingService::new(
            BookingDependencies {
                store: Arc::new(InMemoryReservationStore::new()),
                directory: Arc::new(InMemoryDisplayDirectory::with_displays([display.clone()])),
                payments: Arc::new(MockPaymentGateway::new()),
                notifier: Arc::new(RecordingNotificationSender::new()),
                clock: Arc::new(clock.clone()),
            },
            &BookingConfig::default(),
        );
        (service, display, clock)
    }

    fn request(display: &Display, starts_in: ChronoDuration) -> ReservationRequest {
        ReservationRequest {
            display_id: display.id,
            campaign_id: CampaignId::new(),
            advertiser_id: AdvertiserId::new(),
            window: BookingWindow::starting_at(test_epoch() + starts_in, ChronoDuration::days(7)).unwrap(),
            ad_duration: AdDuration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn test_expires_only_past_grace_period() {
        let (service, display, clock) = setup();
        let sweeper = ExpirySweeper::new(service.clone(), SweeperConfig::default());
        let reservation = service
            .create_reservation(request(&display, ChronoDuration::days(3)))
            .await
            .unwrap();

        clock.advance(ChronoDuration::hours(23));
        assert!(sweeper.sweep_once().await.is_empty());

        clock.advance(ChronoDuration::hours(2));
        let report = sweeper.sweep_once().await;
        assert_eq!(report.expired, 1);

        let stored = service.get_reservation(reservation.id).await.unwrap();
        assert_eq!(stored.status, ReservationStatus::Expired);

        // Idempotent: nothing left to do.
        assert!(sweeper.sweep_once().await.is_empty());
    }

    #[tokio::test]
    async fn test_completes_finished_bookings() {
        let (service, display, clock) = setup();
        let sweeper = ExpirySweeper::new(service.clone(), SweeperConfig::default());
        let reservation = service
            .create_reservation(request(&display, ChronoDuration::days(1)))
            .await
            .unwrap();
        let paid = service.initiate_payment(reservation.id).await.unwrap();
        service
            .apply_payment_callback(PaymentCallback {
                payment_reference: paid.payment_reference.unwrap(),
                outcome: PaymentOutcome::Succeeded,
            })
            .await
            .unwrap();

        clock.advance(ChronoDuration::days(8));
        let report = sweeper.sweep_once().await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.expired, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (service, _, _) = setup();
        let sweeper = ExpirySweeper::new(
            service,
            SweeperConfig {
                interval: Duration::from_millis(5),
                batch_size: 10,
            },
        );
        let (tx, rx) = broadcast::channel(1);
        let handle = sweeper.spawn(rx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
