//! Adherence statistics over a trailing window of dose logs.
//!
//! Everything here is a pure function of its inputs. Callers recompute on
//! every render instead of maintaining running totals.

use crate::{AdherenceStats, DailyAdherence, DoseLog, DoseStatus, Medication};
use chrono::{DateTime, Days, Duration, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Default trailing window used by the dashboard
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Default number of days shown in the bar chart
pub const DEFAULT_CHART_DAYS: u32 = 7;

impl AdherenceStats {
    /// Build stats from raw counts
    ///
    /// No doses due counts as perfect adherence.
    pub fn from_counts(taken: u32, skipped: u32) -> Self {
        let total = taken + skipped;
        let adherence_percentage = if total == 0 {
            100
        } else {
            ((f64::from(taken) / f64::from(total)) * 100.0).round() as u8
        };

        Self {
            total_doses: total,
            taken_doses: taken,
            skipped_doses: skipped,
            adherence_percentage,
        }
    }
}

/// Compute adherence for logs whose action time falls in `(window_start, now]`
pub fn compute_stats(
    logs: &[DoseLog],
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AdherenceStats {
    count(
        logs.iter()
            .filter(|log| log.action_time > window_start && log.action_time <= now),
    )
}

/// Compute adherence over the last `window_days` days ending at `now`
///
/// A window reaching past the earliest representable instant covers all
/// history.
pub fn compute_trailing_stats(logs: &[DoseLog], now: DateTime<Utc>, window_days: u32) -> AdherenceStats {
    let window_start = now
        .checked_sub_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    compute_stats(logs, window_start, now)
}

/// Same as [`compute_stats`], restricted to a single medication
pub fn stats_for_medication(
    logs: &[DoseLog],
    medication_id: Uuid,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AdherenceStats {
    count(logs.iter().filter(|log| {
        log.medication_id == medication_id
            && log.action_time > window_start
            && log.action_time <= now
    }))
}

fn count<'a>(logs: impl Iterator<Item = &'a DoseLog>) -> AdherenceStats {
    let (taken, skipped) = logs.fold((0u32, 0u32), |(taken, skipped), log| match log.status {
        DoseStatus::Taken => (taken + 1, skipped),
        DoseStatus::Skipped => (taken, skipped + 1),
    });
    AdherenceStats::from_counts(taken, skipped)
}

/// Per-day taken/skipped counts for the most recent `days` calendar days
///
/// Dates are calendar days in `now`'s timezone, oldest first, ending with
/// today. Days without logs are present with zero counts.
pub fn compute_daily_series<Tz: TimeZone>(
    logs: &[DoseLog],
    now: &DateTime<Tz>,
    days: u32,
) -> Vec<DailyAdherence> {
    let tz = now.timezone();
    let today = now.date_naive();

    let mut buckets: HashMap<NaiveDate, (u32, u32)> = HashMap::new();
    for log in logs {
        let date = log.action_time.with_timezone(&tz).date_naive();
        let entry = buckets.entry(date).or_default();
        match log.status {
            DoseStatus::Taken => entry.0 += 1,
            DoseStatus::Skipped => entry.1 += 1,
        }
    }

    (0..days)
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
        .map(|date| {
            let (taken, skipped) = buckets.get(&date).copied().unwrap_or_default();
            DailyAdherence {
                date,
                taken,
                skipped,
            }
        })
        .collect()
}

/// Plain-text adherence summary handed to the suggestion service
///
/// Counts every log recorded for the medication, not just the trailing window.
pub fn adherence_summary(medication: &Medication, logs: &[DoseLog]) -> String {
    let (taken, skipped) = logs
        .iter()
        .filter(|log| log.medication_id == medication.id)
        .fold((0u32, 0u32), |(t, s), log| match log.status {
            DoseStatus::Taken => (t + 1, s),
            DoseStatus::Skipped => (t, s + 1),
        });

    format!(
        "User has taken {} doses and skipped {} doses for {}.",
        taken, skipped, medication.name
    )
}
