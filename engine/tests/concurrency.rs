//! Admission and transition races on a multi-threaded runtime.

#![allow(clippy::unwrap_used)]

mod common;

use adslot_engine::{
    AdDuration, BookingError, CallbackOutcome, ExpirySweeper, PaymentCallback, PaymentOutcome,
    ReservationStatus, SweeperConfig,
};
use chrono::Duration;
use common::{request, week_from, Harness};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_admissions_never_exceed_capacity() {
    let h = Arc::new(Harness::new());
    let display = h.display(30, 10_000);

    // Staggered overlapping windows, 7s each: at most four fit at any instant.
    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let h = Arc::clone(&h);
            let display = display.clone();
            tokio::spawn(async move {
                let offset = Duration::hours(i64::from(i % 5));
                h.service
                    .create_reservation(request(&display, week_from(offset), 7))
                    .await
            })
        })
        .collect();

    let mut admitted = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(reservation) => admitted.push(reservation),
            Err(error) => assert!(
                matches!(error, BookingError::InsufficientCapacity { .. }),
                "unexpected admission error: {error}"
            ),
        }
    }

    assert_eq!(admitted.len(), 4);

    // Check the invariant at every window boundary.
    for sample in &admitted {
        let load: u32 = admitted
            .iter()
            .filter(|r| r.window.contains(sample.window.start()))
            .map(|r| r.ad_duration.as_secs())
            .sum();
        assert!(load <= 30, "{load}s committed at {}", sample.window.start());
    }

    assert!(h.service.arbiter().locks().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn displays_do_not_block_each_other() {
    let h = Arc::new(Harness::new());
    let displays: Vec<_> = (0..16).map(|_| h.display(10, 10_000)).collect();

    let tasks: Vec<_> = displays
        .iter()
        .cloned()
        .map(|display| {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                h.service
                    .create_reservation(request(&display, week_from(Duration::zero()), 10))
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    for display in &displays {
        let report = h
            .service
            .capacity(display.id, week_from(Duration::zero()))
            .await
            .unwrap();
        assert_eq!(report.free, AdDuration::ZERO);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_callback_and_sweeper_commit_exactly_once() {
    for _ in 0..20 {
        let h = Arc::new(Harness::new());
        let display = h.display(30, 10_000);
        let sweeper = ExpirySweeper::new(h.service.clone(), SweeperConfig::default());

        let reservation = h
            .service
            .create_reservation(request(&display, week_from(Duration::days(3)), 10))
            .await
            .unwrap();
        let paid = h.service.initiate_payment(reservation.id).await.unwrap();
        h.clock.advance(Duration::hours(25));

        let callback = {
            let h = Arc::clone(&h);
            let payment_reference = paid.payment_reference.clone().unwrap();
            tokio::spawn(async move {
                h.service
                    .apply_payment_callback(PaymentCallback {
                        payment_reference,
                        outcome: PaymentOutcome::Succeeded,
                    })
                    .await
            })
        };
        let sweep = tokio::spawn(async move { sweeper.sweep_once().await });

        let callback = callback.await.unwrap().unwrap();
        let report = sweep.await.unwrap();
        let stored = h.service.get_reservation(reservation.id).await.unwrap();

        match callback {
            CallbackOutcome::Applied(_) => {
                assert_eq!(stored.status, ReservationStatus::Confirmed);
                assert_eq!(report.expired, 0);
            },
            CallbackOutcome::AlreadyProcessed(_) => {
                assert_eq!(stored.status, ReservationStatus::Expired);
                assert_eq!(report.expired, 1);
            },
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_callbacks_race_to_one_transition() {
    let h = Arc::new(Harness::new());
    let display = h.display(30, 10_000);
    let reservation = h
        .service
        .create_reservation(request(&display, week_from(Duration::days(1)), 10))
        .await
        .unwrap();
    let paid = h.service.initiate_payment(reservation.id).await.unwrap();
    let reference = paid.payment_reference.unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let h = Arc::clone(&h);
            let payment_reference = reference.clone();
            tokio::spawn(async move {
                h.service
                    .apply_payment_callback(PaymentCallback {
                        payment_reference,
                        outcome: PaymentOutcome::Succeeded,
                    })
                    .await
            })
        })
        .collect();

    let mut applied = 0;
    for task in tasks {
        if matches!(task.await.unwrap().unwrap(), CallbackOutcome::Applied(_)) {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payment_initiations_record_one_reference() {
    let h = Arc::new(Harness::new());
    let display = h.display(30, 10_000);
    let reservation = h
        .service
        .create_reservation(request(&display, week_from(Duration::days(1)), 10))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.service.initiate_payment(reservation.id).await })
        })
        .collect();

    let mut references = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(r) => references.push(r.payment_reference.unwrap()),
            Err(error) => assert!(matches!(error, BookingError::DuplicatePayment { .. })),
        }
    }

    assert_eq!(references.len(), 1);
    let stored = h.service.get_reservation(reservation.id).await.unwrap();
    assert_eq!(stored.payment_reference.as_ref(), references.first());

    // Every authorization that did not stick was handed back.
    let mut superseded: Vec<_> = h
        .payments
        .authorizations()
        .into_iter()
        .filter(|reference| Some(reference) != references.first())
        .collect();
    let mut refunded: Vec<_> = h.payments.refunds().into_iter().map(|(reference, _)| reference).collect();
    superseded.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    refunded.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(refunded, superseded);
}
