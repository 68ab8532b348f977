//! # Adslot Testing
//!
//! Testing utilities and helpers for the adslot booking engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`ReducerTest`], a Given/When/Then harness for reducers
//! - Effect assertion helpers
//!
//! ## Example
//!
//! ```ignore
//! use adslot_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(LifecycleReducer::new())
//!     .with_env(env)
//!     .given_state(pending_reservation())
//!     .when_action(LifecycleAction::CapturePayment { .. })
//!     .then_state(|state| assert_eq!(state.reservation.status, ReservationStatus::Confirmed))
//!     .run();
//! ```

use adslot_core::environment::Clock;
use chrono::{DateTime, Utc};

pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use adslot_testing::mocks::FixedClock;
    /// use adslot_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test moves it.
    ///
    /// Clones share the same instant, so a test can hand one clone to the
    /// engine and advance time through another (grace periods, window ends).
    ///
    /// ```
    /// use adslot_testing::mocks::ManualClock;
    /// use adslot_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let start = Utc::now();
    /// let clock = ManualClock::new(start);
    /// let handle = clock.clone();
    /// handle.advance(Duration::hours(25));
    /// assert_eq!(clock.now(), start + Duration::hours(25));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward (or backward, for a negative duration).
        pub fn advance(&self, by: chrono::Duration) {
            let mut guard = self
                .time
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard += by;
        }

        /// Jump to an absolute instant.
        pub fn set(&self, time: DateTime<Utc>) {
            let mut guard = self
                .time
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (Monday 2025-01-06 09:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// Monday 2025-01-06 09:00:00 UTC, the instant every test clock starts at.
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{test_clock, test_epoch, FixedClock, ManualClock};
pub use reducer_test::{assertions, ReducerTest};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, Timelike, Weekday};

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_epoch_is_monday_morning() {
        let epoch = test_epoch();
        assert_eq!(epoch.weekday(), Weekday::Mon);
        assert_eq!(epoch.hour(), 9);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(test_epoch());
        let other = clock.clone();
        other.advance(Duration::hours(26));
        assert_eq!(clock.now(), test_epoch() + Duration::hours(26));

        clock.set(test_epoch());
        assert_eq!(other.now(), test_epoch());
    }
}
