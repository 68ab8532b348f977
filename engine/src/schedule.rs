//! Recurring availability schedules.
//!
//! A display may restrict bookings to certain months and to weekly time slots
//! (e.g. "weekdays 07:00-22:00, April through September"). All evaluation is
//! done in UTC.

use crate::error::{BookingError, Result};
use crate::types::BookingWindow;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Minutes in a day; the exclusive upper bound of a slot.
pub const MINUTES_PER_DAY: u16 = 1440;

/// A recurring weekly slot: `[start_minute, end_minute)` on `weekday`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySlot {
    /// Day of week the slot recurs on
    pub weekday: Weekday,
    /// Inclusive start, minutes after midnight
    pub start_minute: u16,
    /// Exclusive end, minutes after midnight, at most 1440
    pub end_minute: u16,
}

impl WeeklySlot {
    /// Creates a slot.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidSchedule`] unless `start_minute < end_minute <= 1440`.
    pub fn new(weekday: Weekday, start_minute: u16, end_minute: u16) -> Result<Self> {
        let slot = Self {
            weekday,
            start_minute,
            end_minute,
        };
        slot.validate()?;
        Ok(slot)
    }

    /// The whole of `weekday`.
    #[must_use]
    pub const fn all_day(weekday: Weekday) -> Self {
        Self {
            weekday,
            start_minute: 0,
            end_minute: MINUTES_PER_DAY,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.start_minute >= self.end_minute || self.end_minute > MINUTES_PER_DAY {
            return Err(BookingError::InvalidSchedule {
                reason: format!(
                    "slot on {} must satisfy start < end <= {MINUTES_PER_DAY}, got [{}, {})",
                    self.weekday, self.start_minute, self.end_minute
                ),
            });
        }
        Ok(())
    }

    fn covers(&self, instant: DateTime<Utc>) -> bool {
        let second = instant.num_seconds_from_midnight();
        instant.weekday() == self.weekday
            && u32::from(self.start_minute) * 60 <= second
            && second < u32::from(self.end_minute) * 60
    }
}

/// Months and weekly slots during which a display may be booked.
///
/// Empty `active_months` means every month; empty `weekly_slots` means every
/// hour of every day.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule")]
pub struct AvailabilitySchedule {
    active_months: Vec<u32>,
    weekly_slots: Vec<WeeklySlot>,
}

#[derive(Deserialize)]
struct RawSchedule {
    #[serde(default)]
    active_months: Vec<u32>,
    #[serde(default)]
    weekly_slots: Vec<WeeklySlot>,
}

impl TryFrom<RawSchedule> for AvailabilitySchedule {
    type Error = BookingError;

    fn try_from(raw: RawSchedule) -> Result<Self> {
        Self::new(raw.active_months, raw.weekly_slots)
    }
}

impl AvailabilitySchedule {
    /// A schedule without restrictions.
    #[must_use]
    pub const fn always() -> Self {
        Self {
            active_months: Vec::new(),
            weekly_slots: Vec::new(),
        }
    }

    /// Creates a schedule from 1-based months and weekly slots.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidSchedule`] for a month outside `1..=12`
    /// or a malformed slot.
    pub fn new(mut active_months: Vec<u32>, weekly_slots: Vec<WeeklySlot>) -> Result<Self> {
        if let Some(month) = active_months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(BookingError::InvalidSchedule {
                reason: format!("month {month} is not in 1..=12"),
            });
        }
        for slot in &weekly_slots {
            slot.validate()?;
        }
        active_months.sort_unstable();
        active_months.dedup();
        Ok(Self {
            active_months,
            weekly_slots,
        })
    }

    /// Active months, 1-based, sorted
    #[must_use]
    pub fn active_months(&self) -> &[u32] {
        &self.active_months
    }

    /// Weekly slots
    #[must_use]
    pub fn weekly_slots(&self) -> &[WeeklySlot] {
        &self.weekly_slots
    }

    fn month_active(&self, instant: DateTime<Utc>) -> bool {
        self.active_months.is_empty() || self.active_months.contains(&instant.month())
    }

    /// Whether every instant of `window` is bookable.
    ///
    /// Walks the window slot by slot: each step must start inside an active
    /// month and a slot, and advances to that slot's end. Slots ending at
    /// midnight chain into the next day's slots starting at midnight. At most
    /// one step per slot per day, and windows are capped at
    /// [`BookingWindow::MAX_DAYS`].
    #[must_use]
    pub fn contains(&self, window: &BookingWindow) -> bool {
        let mut cursor = window.start();

        while cursor < window.end() {
            if !self.month_active(cursor) {
                return false;
            }

            let midnight = cursor.date_naive().and_time(NaiveTime::MIN).and_utc();
            let next = if self.weekly_slots.is_empty() {
                midnight + Duration::days(1)
            } else {
                match self.weekly_slots.iter().find(|slot| slot.covers(cursor)) {
                    Some(slot) => midnight + Duration::minutes(i64::from(slot.end_minute)),
                    None => return false,
                }
            };

            cursor = next;
        }

        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, day, hour, minute, 0).unwrap()
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> BookingWindow {
        BookingWindow::new(start, end).unwrap()
    }

    fn business_hours() -> AvailabilitySchedule {
        let slots = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
            .into_iter()
            .map(|day| WeeklySlot::new(day, 8 * 60, 18 * 60).unwrap())
            .collect();
        AvailabilitySchedule::new(vec![], slots).unwrap()
    }

    #[test]
    fn test_always_contains_everything() {
        let schedule = AvailabilitySchedule::always();
        assert!(schedule.contains(&window(at(1, 6, 0, 0), at(12, 31, 23, 0))));
    }

    #[test]
    fn test_window_inside_single_slot() {
        // 2025-01-06 is a Monday
        let schedule = business_hours();
        assert!(schedule.contains(&window(at(1, 6, 9, 0), at(1, 6, 17, 0))));
        assert!(schedule.contains(&window(at(1, 6, 8, 0), at(1, 6, 18, 0))));
    }

    #[test]
    fn test_window_leaking_out_of_slot_is_rejected() {
        let schedule = business_hours();
        assert!(!schedule.contains(&window(at(1, 6, 7, 59), at(1, 6, 9, 0))));
        assert!(!schedule.contains(&window(at(1, 6, 17, 0), at(1, 6, 18, 1))));
        // Spans the gap overnight
        assert!(!schedule.contains(&window(at(1, 6, 9, 0), at(1, 7, 9, 0))));
        // Saturday
        assert!(!schedule.contains(&window(at(1, 11, 9, 0), at(1, 11, 10, 0))));
    }

    #[test]
    fn test_slots_chain_across_midnight() {
        let schedule = AvailabilitySchedule::new(
            vec![],
            vec![
                WeeklySlot::new(Weekday::Fri, 20 * 60, MINUTES_PER_DAY).unwrap(),
                WeeklySlot::new(Weekday::Sat, 0, 2 * 60).unwrap(),
            ],
        )
        .unwrap();

        // Friday 2025-01-10 22:00 to Saturday 01:00
        assert!(schedule.contains(&window(at(1, 10, 22, 0), at(1, 11, 1, 0))));
        assert!(!schedule.contains(&window(at(1, 10, 22, 0), at(1, 11, 3, 0))));
    }

    #[test]
    fn test_active_months() {
        let summer = AvailabilitySchedule::new(vec![6, 7, 8], vec![]).unwrap();
        assert!(summer.contains(&window(at(6, 1, 0, 0), at(8, 31, 23, 59))));
        assert!(!summer.contains(&window(at(8, 30, 0, 0), at(9, 2, 0, 0))));
        assert!(!summer.contains(&window(at(5, 31, 23, 0), at(6, 1, 1, 0))));
    }

    #[test]
    fn test_longest_window_walks_every_day() {
        let every_day = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .map(WeeklySlot::all_day)
        .collect();
        let schedule = AvailabilitySchedule::new(vec![], every_day).unwrap();
        let start = at(1, 6, 0, 0);
        let longest = BookingWindow::starting_at(start, Duration::days(BookingWindow::MAX_DAYS)).unwrap();

        assert!(schedule.contains(&longest));
        assert!(!business_hours().contains(&longest));
    }

    #[test]
    fn test_invalid_definitions_rejected() {
        assert!(AvailabilitySchedule::new(vec![13], vec![]).is_err());
        assert!(AvailabilitySchedule::new(vec![0], vec![]).is_err());
        assert!(WeeklySlot::new(Weekday::Mon, 600, 600).is_err());
        assert!(WeeklySlot::new(Weekday::Mon, 600, 1441).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let parsed: std::result::Result<AvailabilitySchedule, _> = serde_json::from_str(
            r#"{"active_months":[4,5],"weekly_slots":[{"weekday":"Mon","start_minute":0,"end_minute":1440}]}"#,
        );
        let schedule = parsed.unwrap();
        assert_eq!(schedule.active_months(), &[4, 5]);
        assert_eq!(schedule.weekly_slots(), &[WeeklySlot::all_day(Weekday::Mon)]);

        let bad: std::result::Result<AvailabilitySchedule, _> =
            serde_json::from_str(r#"{"active_months":[14]}"#);
        assert!(bad.is_err());
    }
}
