//! Loop capacity accounting.
//!
//! A display rotates its ads through a loop of fixed total length. Each
//! holding reservation occupies `ad_duration` of that loop for its window.
//! [`CapacityModel`] answers "how much of the loop is already committed over
//! this window?" under a [`CapacityPolicy`].

use crate::types::{AdDuration, BookingWindow, Reservation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How overlapping commitments are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Every holding reservation touching the window counts in full.
    #[default]
    SumOfOverlaps,
    /// Only the largest load at any single instant of the window counts.
    ///
    /// Admits strictly more than [`Self::SumOfOverlaps`] when the existing
    /// overlapping reservations do not overlap each other.
    PeakConcurrent,
}

impl CapacityPolicy {
    /// Configuration name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SumOfOverlaps => "sum",
            Self::PeakConcurrent => "peak",
        }
    }
}

impl fmt::Display for CapacityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapacityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" | "sum_of_overlaps" => Ok(Self::SumOfOverlaps),
            "peak" | "peak_concurrent" => Ok(Self::PeakConcurrent),
            other => Err(format!(
                "unknown capacity policy '{other}', expected 'sum' or 'peak'"
            )),
        }
    }
}

/// Capacity usage of a display over a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityReport {
    /// Display loop capacity
    pub capacity: AdDuration,
    /// Loop time already committed over the window
    pub committed: AdDuration,
    /// Loop time still available over the window
    pub free: AdDuration,
}

impl CapacityReport {
    /// Whether `requested` more seconds still fit.
    #[must_use]
    pub const fn fits(&self, requested: AdDuration) -> bool {
        requested.as_secs() <= self.free.as_secs()
    }
}

/// A display's rotation budget and the policy used to account for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityModel {
    capacity: AdDuration,
    policy: CapacityPolicy,
}

impl CapacityModel {
    /// Model for a loop of `capacity` under `policy`.
    #[must_use]
    pub const fn new(capacity: AdDuration, policy: CapacityPolicy) -> Self {
        Self { capacity, policy }
    }

    /// Loop capacity
    #[must_use]
    pub const fn capacity(&self) -> AdDuration {
        self.capacity
    }

    /// Committed loop time over `window`.
    ///
    /// Reservations that do not hold capacity or do not overlap `window` are
    /// ignored, so callers may pass a superset.
    #[must_use]
    pub fn committed(&self, window: &BookingWindow, reservations: &[Reservation]) -> AdDuration {
        let holding = reservations
            .iter()
            .filter(|r| r.holds_capacity_during(window));

        match self.policy {
            CapacityPolicy::SumOfOverlaps => holding
                .map(|r| r.ad_duration)
                .fold(AdDuration::ZERO, AdDuration::saturating_add),
            CapacityPolicy::PeakConcurrent => peak_load(window, holding),
        }
    }

    /// Capacity, committed and free loop time over `window`.
    #[must_use]
    pub fn report(&self, window: &BookingWindow, reservations: &[Reservation]) -> CapacityReport {
        let committed = self.committed(window, reservations);
        CapacityReport {
            capacity: self.capacity,
            committed,
            free: self.capacity.saturating_sub(committed),
        }
    }
}

/// Sweep-line maximum of concurrent load, clipped to `window`.
///
/// Ends sort before starts at the same instant: half-open windows that merely
/// touch never run concurrently.
fn peak_load<'a>(
    window: &BookingWindow,
    holding: impl Iterator<Item = &'a Reservation>,
) -> AdDuration {
    let mut events: Vec<(DateTime<Utc>, i64)> = Vec::new();
    for reservation in holding {
        let secs = i64::from(reservation.ad_duration.as_secs());
        events.push((reservation.window.start().max(window.start()), secs));
        events.push((reservation.window.end().min(window.end()), -secs));
    }
    events.sort_unstable();

    let mut load: i64 = 0;
    let mut peak: i64 = 0;
    for (_, delta) in events {
        load += delta;
        peak = peak.max(load);
    }

    AdDuration::from_secs(u32::try_from(peak).unwrap_or(u32::MAX))
}
