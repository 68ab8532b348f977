//! Reporting endpoints.
//!
//! - GET /api/reports/active-campaigns - Running confirmed bookings per advertiser
//! - GET /api/reports/revenue - Platform revenue, total and per display

use super::error::ApiError;
use crate::server::state::AppState;
use crate::types::{AdvertiserId, DisplayId};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Active campaigns per advertiser.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveCampaignsResponse {
    /// Confirmed reservations running now, per advertiser
    pub advertisers: BTreeMap<AdvertiserId, usize>,
    /// Sum over all advertisers
    pub total: usize,
}

/// Platform revenue.
#[derive(Debug, Serialize, Deserialize)]
pub struct RevenueResponse {
    /// Sum over Confirmed and Completed reservations, in cents
    pub total_cents: u64,
    /// Number of reservations counted
    pub reservations: usize,
    /// Revenue per display, in cents
    pub by_display: BTreeMap<DisplayId, u64>,
}

/// Active campaign counts.
///
/// # Errors
///
/// 500 if the store cannot be read.
pub async fn active_campaigns(
    State(state): State<AppState>,
) -> Result<Json<ActiveCampaignsResponse>, ApiError> {
    let advertisers = state
        .service
        .aggregator()
        .active_campaigns_by_advertiser()
        .await?;

    Ok(Json(ActiveCampaignsResponse {
        total: advertisers.values().sum(),
        advertisers,
    }))
}

/// Platform revenue.
///
/// # Errors
///
/// 500 if the store cannot be read.
pub async fn revenue(State(state): State<AppState>) -> Result<Json<RevenueResponse>, ApiError> {
    let aggregator = state.service.aggregator();
    let total = aggregator.platform_revenue().await?;
    let by_display = aggregator.revenue_by_display().await?;

    Ok(Json(RevenueResponse {
        total_cents: total.total.cents(),
        reservations: total.reservations,
        by_display: by_display
            .into_iter()
            .map(|(display_id, money)| (display_id, money.cents()))
            .collect(),
    }))
}
