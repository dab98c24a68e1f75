//! Next-dose projection for a medication's recurrence rule.
//!
//! The projector only looks at today's and tomorrow's wall-clock times:
//! - Today's listed times still ahead of `from` win, earliest first
//! - Otherwise the first-listed time on the next calendar day is returned
//!
//! Weekly days and interval spacing are not consulted on rollover. Callers
//! re-run the projection on a fixed cadence (e.g. once a minute) rather than
//! arming timers.

use crate::{ScheduleKind, ScheduleRule, TimeOfDay};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone};

/// Longest DST gap we step across when a listed time does not exist locally
const MAX_GAP_MINUTES: i64 = 180;

/// Compute the next scheduled dose instant strictly after `from`
///
/// The result is in the same timezone as `from`. An empty `times` list,
/// which validation never produces, projects exactly one day ahead.
pub fn next_dose<Tz: TimeZone>(schedule: &ScheduleRule, from: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = from.timezone();
    let today = from.date_naive();

    let upcoming = schedule
        .times
        .iter()
        .map(|time| local_instant(&tz, today, *time))
        .filter(|candidate| candidate > from)
        .min();

    if let Some(next) = upcoming {
        return next;
    }

    let Some(first) = schedule.times.first() else {
        return from.clone() + Duration::days(1);
    };
    let tomorrow = today.succ_opt().unwrap_or(today);
    local_instant(&tz, tomorrow, *first)
}

/// Resolve a wall-clock time on a date to an instant in `tz`
///
/// Ambiguous times (DST fall-back) take the earlier instant, so a listed
/// time is due once on a repeated hour. Times inside a DST gap move forward
/// to the first minute that exists.
fn local_instant<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: TimeOfDay) -> DateTime<Tz> {
    let naive = date.and_time(time.as_naive());

    for minutes in 0..=MAX_GAP_MINUTES {
        let shifted: NaiveDateTime = naive + Duration::minutes(minutes);
        match tz.from_local_datetime(&shifted) {
            LocalResult::Single(dt) => return dt,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => continue,
        }
    }

    tz.from_utc_datetime(&naive)
}

impl ScheduleRule {
    /// Human-readable summary, e.g. "Daily at 09:00, 21:00"
    pub fn describe(&self) -> String {
        let times = self
            .times
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        match &self.kind {
            ScheduleKind::Daily => format!("Daily at {}", times),
            ScheduleKind::Weekly { days } => {
                let names = days
                    .iter()
                    .map(|d| weekday_name(*d))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Weekly on {} at {}", names, times)
            }
            ScheduleKind::Interval { interval_days: 1 } => format!("Every day at {}", times),
            ScheduleKind::Interval { interval_days } => {
                format!("Every {} days at {}", interval_days, times)
            }
        }
    }
}

/// Short weekday name for an index where 0 = Sunday
pub fn weekday_name(index: u8) -> &'static str {
    match index {
        0 => "Sun",
        1 => "Mon",
        2 => "Tue",
        3 => "Wed",
        4 => "Thu",
        5 => "Fri",
        6 => "Sat",
        _ => "?",
    }
}
