//! Time and timestamp helpers.
//!
//! Countdowns use absolute UTC timestamps; schedules are evaluated against
//! the controller's local wall clock, resolved through a [`WallClock`].

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};

/// UTC timestamp used for run start times, event times, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// How a UTC instant maps to the local wall clock schedules are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WallClock {
    /// The operating system's local time zone.
    #[default]
    System,
    /// A fixed offset from UTC.
    Fixed(FixedOffset),
}

impl WallClock {
    /// Local date and time of `ts`.
    #[must_use]
    pub fn local(&self, ts: Timestamp) -> NaiveDateTime {
        match self {
            Self::System => ts.with_timezone(&Local).naive_local(),
            Self::Fixed(offset) => ts.with_timezone(offset).naive_local(),
        }
    }

    /// Local calendar date of `ts`.
    #[must_use]
    pub fn today(&self, ts: Timestamp) -> NaiveDate {
        self.local(ts).date()
    }
}

/// Whole calendar days from `from` to `to` (negative when `to` is earlier).
#[must_use]
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_apply_fixed_offset_when_resolving_local_time() {
        let clock = WallClock::Fixed(FixedOffset::east_opt(2 * 3600).unwrap());
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 23, 30, 0).unwrap();
        let local = clock.local(ts);
        assert_eq!(local.to_string(), "2025-06-02 01:30:00");
        assert_eq!(clock.today(ts), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
    }

    #[test]
    fn should_count_days_across_year_boundary() {
        let from = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(days_between(from, to), 3);
    }

    #[test]
    fn should_count_leap_day() {
        let from = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(days_between(from, to), 2);
    }
}
