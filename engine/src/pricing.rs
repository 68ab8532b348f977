//! Price calculation.
//!
//! `price = weekly_rate × (window length / 7 days)`, rounded half-up to whole
//! cents. The arithmetic is done in integer milliseconds so the result is
//! exact and deterministic.

use crate::error::{BookingError, Result};
use crate::types::{BookingWindow, Money};

/// Milliseconds in seven days.
pub const WEEK_MS: u128 = 7 * 24 * 60 * 60 * 1000;

/// Computes the price of booking `window` at `weekly_rate`.
///
/// # Errors
///
/// Returns [`BookingError::InvalidPricing`] if the price rounds to zero or
/// does not fit in [`Money`].
pub fn compute_price(weekly_rate: Money, window: &BookingWindow) -> Result<Money> {
    let window_ms = window.duration().num_milliseconds();
    let window_ms = u128::try_from(window_ms)
        .ok()
        .filter(|ms| *ms > 0)
        .ok_or_else(|| BookingError::InvalidPricing {
            reason: format!("window {window} has no positive length"),
        })?;

    let cents = (u128::from(weekly_rate.cents()) * window_ms + WEEK_MS / 2) / WEEK_MS;

    if cents == 0 {
        return Err(BookingError::InvalidPricing {
            reason: format!("price for {window} at {weekly_rate}/week rounds to zero"),
        });
    }

    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| BookingError::InvalidPricing {
            reason: format!("price for {window} overflows"),
        })
}
