//! Synthetic adherence history for demos and tests.
//!
//! Not part of the tracking logic: this produces plausible dose logs so a
//! fresh install has something to chart. Pass a seeded RNG for
//! reproducible output.

use crate::{DoseLog, DoseStatus, Error, Medication, Result};
use chrono::{DateTime, Days, LocalResult, TimeZone, Utc};
use rand::Rng;
use uuid::Uuid;

/// Adherence rate used when the caller has no preference
pub const DEFAULT_ADHERENCE_RATE: f64 = 0.85;

/// Generate one log per medication time per day for the last `days` days
///
/// Day 0 is today in `now`'s timezone; each dose is taken with probability
/// `adherence_rate` and skipped otherwise. Logs for today's times that are
/// still in the future are generated too, matching a full day of history.
pub fn seed_history<Tz, R>(
    medications: &[Medication],
    now: &DateTime<Tz>,
    days: u32,
    adherence_rate: f64,
    rng: &mut R,
) -> Result<Vec<DoseLog>>
where
    Tz: TimeZone,
    R: Rng + ?Sized,
{
    if !(0.0..=1.0).contains(&adherence_rate) {
        return Err(Error::validation(
            "adherence_rate",
            format!("{} is not a probability between 0 and 1", adherence_rate),
        ));
    }

    let tz = now.timezone();
    let today = now.date_naive();
    let mut logs = Vec::new();

    for offset in 0..days {
        let Some(date) = today.checked_sub_days(Days::new(u64::from(offset))) else {
            break;
        };

        for medication in medications {
            for time in &medication.schedule.times {
                let naive = date.and_time(time.as_naive());
                let at: DateTime<Utc> = match tz.from_local_datetime(&naive) {
                    LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                    LocalResult::None => continue,
                };

                let status = if rng.gen_bool(adherence_rate) {
                    DoseStatus::Taken
                } else {
                    DoseStatus::Skipped
                };

                logs.push(DoseLog {
                    id: Uuid::new_v4(),
                    medication_id: medication.id,
                    scheduled_time: at,
                    action_time: at,
                    status,
                });
            }
        }
    }

    tracing::debug!(
        "Seeded {} dose logs across {} days at rate {}",
        logs.len(),
        days,
        adherence_rate
    );
    Ok(logs)
}
