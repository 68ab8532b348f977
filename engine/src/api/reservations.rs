//! Reservation endpoints.
//!
//! - POST /api/displays/:display_id/reservations - Admit a new reservation
//! - GET /api/displays/:display_id/reservations - List a display's reservations
//! - GET /api/displays/:display_id/capacity?start=&end= - Capacity usage over a window
//! - GET /api/reservations/:id - Reservation details
//! - POST /api/reservations/:id/withdraw - Withdraw an unpaid reservation
//! - POST /api/reservations/:id/deny - Administrative denial

use super::error::ApiError;
use crate::server::state::AppState;
use crate::types::{
    AdDuration, AdvertiserId, BookingWindow, CampaignId, DisplayId, Reservation, ReservationId,
    ReservationRequest, ReservationStatus,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to book a display.
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    /// Campaign the booking belongs to
    pub campaign_id: CampaignId,
    /// Paying advertiser
    pub advertiser_id: AdvertiserId,
    /// Window start (inclusive)
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
    /// Share of the loop in seconds
    pub ad_duration_secs: u32,
}

/// Reservation details.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservationResponse {
    /// Reservation ID
    pub id: ReservationId,
    /// Display ID
    pub display_id: DisplayId,
    /// Campaign ID
    pub campaign_id: CampaignId,
    /// Advertiser ID
    pub advertiser_id: AdvertiserId,
    /// Window start
    pub start: DateTime<Utc>,
    /// Window end
    pub end: DateTime<Utc>,
    /// Loop share in seconds
    pub ad_duration_secs: u32,
    /// Current status
    pub status: ReservationStatus,
    /// Price in cents
    pub price_cents: u64,
    /// Payment reference, once payment was initiated
    pub payment_reference: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            display_id: r.display_id,
            campaign_id: r.campaign_id,
            advertiser_id: r.advertiser_id,
            start: r.window.start(),
            end: r.window.end(),
            ad_duration_secs: r.ad_duration.as_secs(),
            status: r.status,
            price_cents: r.price.cents(),
            payment_reference: r.payment_reference.map(|p| p.as_str().to_string()),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Reservations of one display.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListReservationsResponse {
    /// Reservations, oldest first
    pub reservations: Vec<ReservationResponse>,
    /// Total count
    pub total: usize,
}

/// Window query parameters.
#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    /// Window start (inclusive)
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
}

/// Capacity usage over a window, in seconds of loop time.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacityResponse {
    /// Display ID
    pub display_id: DisplayId,
    /// Loop capacity
    pub capacity_secs: u32,
    /// Committed by Pending and Confirmed reservations
    pub committed_secs: u32,
    /// Still free
    pub free_secs: u32,
}

/// Request to deny a confirmed booking.
#[derive(Debug, Deserialize)]
pub struct DenyReservationRequest {
    /// Reason passed on to the advertiser
    pub reason: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Admit a new Pending reservation.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/displays/550e8400-e29b-41d4-a716-446655440000/reservations \
///   -H "Content-Type: application/json" \
///   -d '{
///     "campaign_id": "660e8400-e29b-41d4-a716-446655440001",
///     "advertiser_id": "770e8400-e29b-41d4-a716-446655440002",
///     "start": "2025-01-06T09:00:00Z",
///     "end": "2025-01-13T09:00:00Z",
///     "ad_duration_secs": 20
///   }'
/// ```
///
/// # Errors
///
/// 422 for a malformed window, 409 when the display is full or closed
/// over the window, 503 when contention could not be resolved.
pub async fn create_reservation(
    State(state): State<AppState>,
    Path(display_id): Path<DisplayId>,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let window = BookingWindow::new(request.start, request.end)?;

    let reservation = state
        .service
        .create_reservation(ReservationRequest {
            display_id,
            campaign_id: request.campaign_id,
            advertiser_id: request.advertiser_id,
            window,
            ad_duration: AdDuration::from_secs(request.ad_duration_secs),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(reservation.into())))
}

/// List every reservation of a display.
///
/// # Errors
///
/// 404 for an unknown display.
pub async fn list_reservations(
    State(state): State<AppState>,
    Path(display_id): Path<DisplayId>,
) -> Result<Json<ListReservationsResponse>, ApiError> {
    let reservations: Vec<ReservationResponse> = state
        .service
        .list_reservations(display_id)
        .await?
        .into_iter()
        .map(ReservationResponse::from)
        .collect();

    Ok(Json(ListReservationsResponse {
        total: reservations.len(),
        reservations,
    }))
}

/// Capacity usage of a display over a window.
///
/// ```bash
/// curl "http://localhost:8080/api/displays/550e8400-e29b-41d4-a716-446655440000/capacity?start=2025-01-06T09:00:00Z&end=2025-01-13T09:00:00Z"
/// ```
///
/// # Errors
///
/// 422 for a malformed window, 404 for an unknown display.
pub async fn get_capacity(
    State(state): State<AppState>,
    Path(display_id): Path<DisplayId>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<CapacityResponse>, ApiError> {
    let window = BookingWindow::new(query.start, query.end)?;
    let report = state.service.capacity(display_id, window).await?;

    Ok(Json(CapacityResponse {
        display_id,
        capacity_secs: report.capacity.as_secs(),
        committed_secs: report.committed.as_secs(),
        free_secs: report.free.as_secs(),
    }))
}

/// Reservation details.
///
/// # Errors
///
/// 404 for an unknown reservation.
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation = state.service.get_reservation(reservation_id).await?;
    Ok(Json(reservation.into()))
}

/// Withdraw an unpaid reservation.
///
/// # Errors
///
/// 409 unless the reservation is Pending.
pub async fn withdraw_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation = state.service.withdraw(reservation_id).await?;
    Ok(Json(reservation.into()))
}

/// Deny a confirmed booking before its window starts; the advertiser is refunded.
///
/// # Errors
///
/// 409 unless the reservation is Confirmed and its window has not started.
pub async fn deny_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<ReservationId>,
    Json(request): Json<DenyReservationRequest>,
) -> Result<Json<ReservationResponse>, ApiError> {
    if request.reason.trim().is_empty() {
        return Err(ApiError::bad_request("A denial reason is required"));
    }
    let reservation = state.service.deny(reservation_id, request.reason).await?;
    Ok(Json(reservation.into()))
}
