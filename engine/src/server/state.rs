//! Application state for the HTTP server.

use crate::service::BookingService;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply, via `Arc`) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Booking operations
    pub service: BookingService,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(service: BookingService) -> Self {
        Self { service }
    }
}
