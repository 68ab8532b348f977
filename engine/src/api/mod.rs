//! HTTP API handlers, organized by domain:
//! - Reservations: admission, listing, capacity, withdrawal, denial
//! - Payments: initiation and provider callbacks
//! - Reports: active campaigns and revenue

pub mod error;
pub mod payments;
pub mod reports;
pub mod reservations;

pub use error::ApiError;
pub use payments::{initiate_payment, payment_callback};
pub use reports::{active_campaigns, revenue};
pub use reservations::{
    create_reservation, deny_reservation, get_capacity, get_reservation, list_reservations,
    withdraw_reservation,
};
