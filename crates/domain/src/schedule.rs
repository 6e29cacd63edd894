//! Schedule evaluation: when an automatic program is due.
//!
//! Everything here works on the local wall-clock date and time; the caller
//! resolves the instant through a [`WallClock`](crate::time::WallClock).

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::program::{Program, Recurrence};
use crate::time::days_between;

/// Calendar days since `last_run`, `None` when the program never ran.
#[must_use]
pub fn days_since(last_run: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    last_run.map(|last| days_between(last, today))
}

impl Recurrence {
    /// Minimum number of days between two runs.
    #[must_use]
    pub fn interval_days(self) -> u32 {
        match self {
            Self::Daily => 1,
            Self::EveryOtherDay => 2,
            Self::Custom { interval_days } => interval_days.max(1),
        }
    }

    /// Whether enough days have passed since `last_run`.
    #[must_use]
    pub fn is_satisfied(self, last_run: Option<NaiveDate>, today: NaiveDate) -> bool {
        days_since(last_run, today).is_none_or(|days| days >= i64::from(self.interval_days()))
    }
}

impl Program {
    /// Whether this program should fire at local time `now`.
    ///
    /// Checks the program's own switch, the month, the activation minute and
    /// the recurrence. The global switch and the once-per-day guard belong to
    /// the caller.
    #[must_use]
    pub fn is_due_at(&self, now: NaiveDateTime) -> bool {
        self.automatic_enabled
            && self.months.contains(now.month())
            && self.activation_time.matches(now.time())
            && self.recurrence.is_satisfied(self.last_run_date, now.date())
    }
}

/// Programs due at `now`, smallest id first.
///
/// Only the first one may start; the rest are skipped for this cycle.
#[must_use]
pub fn due_programs<'a>(
    programs: impl IntoIterator<Item = &'a Program>,
    now: NaiveDateTime,
) -> Vec<&'a Program> {
    let mut due: Vec<&Program> = programs.into_iter().filter(|p| p.is_due_at(now)).collect();
    due.sort_by(|a, b| a.id.cmp(&b.id));
    due
}
