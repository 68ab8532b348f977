//! Payment endpoints.
//!
//! - POST /api/reservations/:id/payment - Authorize the price and record the reference
//! - POST /api/payments/callback - Provider callback, keyed by payment reference
//!
//! Callbacks are idempotent: a replay, or a callback for a reservation that
//! already left Pending, answers 200 with `applied: false`.

use super::error::ApiError;
use super::reservations::ReservationResponse;
use crate::server::state::AppState;
use crate::service::{CallbackOutcome, PaymentCallback};
use crate::types::ReservationId;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

/// Result of a payment callback.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentCallbackResponse {
    /// Whether this callback changed the reservation
    pub applied: bool,
    /// Reservation as it stands now
    pub reservation: ReservationResponse,
}

/// Start payment for a Pending reservation.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/reservations/660e8400-e29b-41d4-a716-446655440001/payment
/// ```
///
/// # Errors
///
/// 409 if payment was already initiated or the reservation is no longer
/// Pending, 502 if the provider refuses.
pub async fn initiate_payment(
    State(state): State<AppState>,
    Path(reservation_id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation = state.service.initiate_payment(reservation_id).await?;
    Ok(Json(reservation.into()))
}

/// Apply a payment provider callback.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/payments/callback \
///   -H "Content-Type: application/json" \
///   -d '{"payment_reference": "pay_123", "outcome": "succeeded"}'
/// ```
///
/// # Errors
///
/// 404 if no reservation carries the reference.
pub async fn payment_callback(
    State(state): State<AppState>,
    Json(callback): Json<PaymentCallback>,
) -> Result<Json<PaymentCallbackResponse>, ApiError> {
    let outcome = state.service.apply_payment_callback(callback).await?;
    let applied = matches!(outcome, CallbackOutcome::Applied(_));
    let reservation = match outcome {
        CallbackOutcome::Applied(r) | CallbackOutcome::AlreadyProcessed(r) => r,
    };

    Ok(Json(PaymentCallbackResponse {
        applied,
        reservation: reservation.into(),
    }))
}
