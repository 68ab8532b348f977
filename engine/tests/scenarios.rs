//! End-to-end booking scenarios against the in-memory store.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use adslot_engine::notification::Notification;
use adslot_engine::{
    AdDuration, BookingError, CallbackOutcome, ExpirySweeper, Money, PaymentCallback,
    PaymentOutcome, ReservationStatus, SweeperConfig,
};
use chrono::Duration;
use common::{request, week_from, Harness};
use std::time::Duration as StdDuration;

#[tokio::test]
async fn overlapping_request_over_capacity_is_rejected() {
    let h = Harness::new();
    let display = h.display(30, 10_000);

    let first = h
        .service
        .create_reservation(request(&display, week_from(Duration::zero()), 20))
        .await
        .unwrap();
    assert_eq!(first.status, ReservationStatus::Pending);

    let second = h
        .service
        .create_reservation(request(&display, week_from(Duration::days(3)), 15))
        .await;
    assert!(matches!(
        second,
        Err(BookingError::InsufficientCapacity {
            requested: 15,
            committed: 20,
            capacity: 30,
            ..
        })
    ));

    // A window that does not overlap is unaffected.
    h.service
        .create_reservation(request(&display, week_from(Duration::days(7)), 15))
        .await
        .unwrap();
}

#[tokio::test]
async fn denial_frees_capacity_immediately() {
    let h = Harness::new();
    let display = h.display(30, 10_000);
    let window = week_from(Duration::days(1));

    let reservation = h
        .service
        .create_reservation(request(&display, window, 20))
        .await
        .unwrap();
    let confirmed = h.confirm(&reservation).await;
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);

    let blocked = h.service.create_reservation(request(&display, window, 25)).await;
    assert!(matches!(blocked, Err(BookingError::InsufficientCapacity { .. })));

    h.service.deny(reservation.id, "creative rejected").await.unwrap();

    let report = h.service.capacity(display.id, window).await.unwrap();
    assert_eq!(report.free, AdDuration::from_secs(30));

    let replacement = h
        .service
        .create_reservation(request(&display, window, 25))
        .await
        .unwrap();
    assert_eq!(replacement.status, ReservationStatus::Pending);

    h.service.effects().wait_idle(StdDuration::from_secs(1)).await.unwrap();
    assert_eq!(
        h.payments.refunds(),
        vec![(confirmed.payment_reference.unwrap(), Money::from_cents(10_000))]
    );
}

#[tokio::test]
async fn two_week_window_costs_twice_the_weekly_rate() {
    let h = Harness::new();
    let display = h.display(30, 10_000);
    let window = adslot_engine::BookingWindow::starting_at(
        adslot_testing::test_epoch(),
        Duration::days(14),
    )
    .unwrap();

    let reservation = h
        .service
        .create_reservation(request(&display, window, 10))
        .await
        .unwrap();

    assert_eq!(reservation.price, Money::from_cents(20_000));
    assert_eq!(reservation.price.to_string(), "$200.00");
}

#[tokio::test]
async fn expired_reservation_rejects_late_payment() {
    let h = Harness::new();
    let display = h.display(30, 10_000);
    let sweeper = ExpirySweeper::new(h.service.clone(), SweeperConfig::default());

    let reservation = h
        .service
        .create_reservation(request(&display, week_from(Duration::days(3)), 20))
        .await
        .unwrap();
    let paid = h.service.initiate_payment(reservation.id).await.unwrap();

    let reference = paid.payment_reference.unwrap();

    h.clock.advance(Duration::hours(25));
    let report = sweeper.sweep_once().await;
    assert_eq!(report.expired, 1);

    // The authorization that never got captured is handed back.
    h.service.effects().wait_idle(StdDuration::from_secs(1)).await.unwrap();
    assert_eq!(h.payments.refunds(), vec![(reference.clone(), reservation.price)]);

    h.clock.advance(Duration::hours(1));
    let late = h
        .service
        .apply_payment_callback(PaymentCallback {
            payment_reference: reference,
            outcome: PaymentOutcome::Succeeded,
        })
        .await
        .unwrap();

    match late {
        CallbackOutcome::AlreadyProcessed(current) => {
            assert_eq!(current.status, ReservationStatus::Expired);
        },
        CallbackOutcome::Applied(r) => panic!("late payment confirmed {}", r.id),
    }

    // The expired reservation released its capacity.
    h.service
        .create_reservation(request(&display, week_from(Duration::days(3)), 30))
        .await
        .unwrap();
}

#[tokio::test]
async fn replayed_success_callback_fires_nothing_twice() {
    let h = Harness::new();
    let display = h.display(30, 10_000);
    let reservation = h
        .service
        .create_reservation(request(&display, week_from(Duration::days(1)), 10))
        .await
        .unwrap();
    let confirmed = h.confirm(&reservation).await;
    let callback = PaymentCallback {
        payment_reference: confirmed.payment_reference.clone().unwrap(),
        outcome: PaymentOutcome::Succeeded,
    };

    for _ in 0..3 {
        let outcome = h.service.apply_payment_callback(callback.clone()).await.unwrap();
        assert!(matches!(outcome, CallbackOutcome::AlreadyProcessed(_)));
    }

    let stored = h.service.get_reservation(reservation.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Confirmed);
    assert_eq!(stored.updated_at, confirmed.updated_at);

    h.service.effects().wait_idle(StdDuration::from_secs(1)).await.unwrap();
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn completed_booking_sends_proof_of_display_once() {
    let h = Harness::new();
    let display = h.display(30, 10_000);
    let sweeper = ExpirySweeper::new(h.service.clone(), SweeperConfig::default());
    let reservation = h
        .service
        .create_reservation(request(&display, week_from(Duration::days(1)), 10))
        .await
        .unwrap();
    h.confirm(&reservation).await;

    h.clock.advance(Duration::days(8));
    assert_eq!(sweeper.sweep_once().await.completed, 1);
    assert!(sweeper.sweep_once().await.is_empty());

    h.service.effects().wait_idle(StdDuration::from_secs(1)).await.unwrap();
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        Notification::ProofOfDisplay { reservation_id, .. } if *reservation_id == reservation.id
    ));

    let revenue = h.service.aggregator().platform_revenue().await.unwrap();
    assert_eq!(revenue.total, Money::from_cents(10_000));
}

#[tokio::test]
async fn notification_failure_does_not_roll_back_denial() {
    let h = Harness::new();
    h.notifier.set_failing(true);
    h.payments.fail_refunds(true);
    let display = h.display(30, 10_000);
    let reservation = h
        .service
        .create_reservation(request(&display, week_from(Duration::days(1)), 10))
        .await
        .unwrap();
    h.confirm(&reservation).await;

    let denied = h.service.deny(reservation.id, "policy").await.unwrap();
    h.service.effects().wait_idle(StdDuration::from_secs(1)).await.unwrap();

    assert_eq!(denied.status, ReservationStatus::Denied);
    let stored = h.service.get_reservation(reservation.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Denied);
}
