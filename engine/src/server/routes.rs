//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api;
use axum::{
    routing::{get, post},
    Router,
};

/// Build the complete Axum router.
///
/// Health checks live at the root, booking operations under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Reservations
        .route(
            "/displays/:display_id/reservations",
            post(api::create_reservation).get(api::list_reservations),
        )
        .route("/displays/:display_id/capacity", get(api::get_capacity))
        .route("/reservations/:id", get(api::get_reservation))
        .route("/reservations/:id/withdraw", post(api::withdraw_reservation))
        .route("/reservations/:id/deny", post(api::deny_reservation))
        // Payments
        .route("/reservations/:id/payment", post(api::initiate_payment))
        .route("/payments/callback", post(api::payment_callback))
        // Reports
        .route("/reports/active-campaigns", get(api::active_campaigns))
        .route("/reports/revenue", get(api::revenue));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .with_state(state)
}
