//! Business metrics for the booking engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `adslot_reservations_total{status}` - Reservations admitted and transitions by resulting status
//! - `adslot_admission_rejections_total{reason}` - Admissions rejected by availability
//! - `adslot_admission_conflicts_total` - Admissions that ran out of optimistic retries
//! - `adslot_transitions_dropped_total{operation}` - Transitions that lost a race or were replayed
//! - `adslot_sweeper_items_total{outcome}` - Reservations handled by the sweeper
//! - `adslot_revenue_cents_total` - Revenue captured in cents
//! - `adslot_refunds_cents_total{reason}` - Refunds the payment gateway accepted, in cents
//! - `adslot_notifications_failed_total{kind}` - Notification deliveries that failed
//! - `adslot_refunds_failed_total{reason}` - Refunds the payment gateway rejected
//!
//! ## Histograms
//! - `adslot_admission_duration_seconds` - Time spent inside the admission section
//! - `adslot_sweep_duration_seconds` - Duration of one sweeper pass

use crate::availability::RejectReason;
use crate::types::{Money, ReservationStatus};
use metrics::{describe_counter, describe_histogram};

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "adslot_reservations_total",
        "Reservations by resulting status (pending on admission, then each transition)"
    );
    describe_counter!(
        "adslot_admission_rejections_total",
        "Admission requests rejected by reason (outside_availability_window, insufficient_capacity)"
    );
    describe_counter!(
        "adslot_admission_conflicts_total",
        "Admission requests that exhausted their optimistic retries"
    );
    describe_histogram!(
        "adslot_admission_duration_seconds",
        "Time spent holding a display's admission section"
    );
    describe_counter!(
        "adslot_transitions_dropped_total",
        "Transitions dropped because the reservation was already processed"
    );
    describe_counter!(
        "adslot_sweeper_items_total",
        "Reservations handled by the sweeper by outcome (expired, completed, skipped, failed)"
    );
    describe_histogram!("adslot_sweep_duration_seconds", "Duration of one sweeper pass");
    describe_counter!("adslot_revenue_cents_total", "Revenue from captured payments in cents");
    describe_counter!(
        "adslot_refunds_cents_total",
        "Refunds accepted by the payment gateway in cents, by reason (denied, withdrawn, expired, superseded)"
    );
    describe_counter!(
        "adslot_notifications_failed_total",
        "Notification deliveries that failed, by kind"
    );
    describe_counter!("adslot_refunds_failed_total", "Refunds the payment gateway rejected, by reason");

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record an admitted reservation.
pub fn record_reservation_admitted(duration_secs: f64) {
    metrics::counter!("adslot_reservations_total", "status" => "pending").increment(1);
    metrics::histogram!("adslot_admission_duration_seconds").record(duration_secs);
}

/// Record a rejected admission.
pub fn record_admission_rejected(reason: &RejectReason) {
    metrics::counter!("adslot_admission_rejections_total", "reason" => reason.as_str()).increment(1);
}

/// Record an admission that ran out of retries.
pub fn record_admission_conflict() {
    metrics::counter!("adslot_admission_conflicts_total").increment(1);
}

/// Record a committed transition.
///
/// # Arguments
///
/// * `to` - Status the reservation moved to
/// * `price` - Reservation price, counted as revenue on confirmation
pub fn record_transition(to: ReservationStatus, price: Money) {
    metrics::counter!("adslot_reservations_total", "status" => to.as_str()).increment(1);
    if to == ReservationStatus::Confirmed {
        metrics::counter!("adslot_revenue_cents_total").increment(price.cents());
    }
    tracing::debug!(status = %to, price_cents = price.cents(), "Recorded transition metric");
}

/// Record a refund the payment gateway accepted.
pub fn record_refund(reason: &'static str, amount: Money) {
    metrics::counter!("adslot_refunds_cents_total", "reason" => reason).increment(amount.cents());
}

/// Record a refund the payment gateway rejected.
pub fn record_refund_failed(reason: &'static str) {
    metrics::counter!("adslot_refunds_failed_total", "reason" => reason).increment(1);
}

/// Record a transition dropped as already processed.
pub fn record_transition_dropped(operation: &'static str) {
    metrics::counter!("adslot_transitions_dropped_total", "operation" => operation).increment(1);
}

/// Record the outcome of one sweeper pass.
pub fn record_sweep(expired: usize, completed: usize, skipped: usize, failed: usize, duration_secs: f64) {
    for (outcome, count) in [
        ("expired", expired),
        ("completed", completed),
        ("skipped", skipped),
        ("failed", failed),
    ] {
        metrics::counter!("adslot_sweeper_items_total", "outcome" => outcome)
            .increment(count as u64);
    }
    metrics::histogram!("adslot_sweep_duration_seconds").record(duration_secs);
}
