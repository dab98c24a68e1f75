//! Session state: the medication list and dose log a presentation layer
//! works against.
//!
//! A [`Tracker`] owns both collections and the repository behind them.
//! Mutations go through `&mut self` and are visible to the next query;
//! derived values (stats, series, next doses) are recomputed on demand.

use crate::adherence::{compute_daily_series, compute_trailing_stats};
use crate::schedule::next_dose;
use crate::store::{MemoryRepository, Repository};
use crate::validation::{validate_medication, NewMedication};
use crate::{AdherenceStats, DailyAdherence, DoseLog, DoseStatus, Error, Medication, Result};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Application state for one session
pub struct Tracker<R: Repository> {
    repo: R,
    medications: Vec<Medication>,
    /// Newest first
    logs: Vec<DoseLog>,
}

impl Tracker<MemoryRepository> {
    /// A tracker with no persistence
    pub fn in_memory() -> Self {
        Self {
            repo: MemoryRepository::new(),
            medications: Vec::new(),
            logs: Vec::new(),
        }
    }
}

impl<R: Repository> Tracker<R> {
    /// Load the current collections from a repository
    pub fn open(repo: R) -> Result<Self> {
        let medications = repo.load_medications()?;
        let mut logs = repo.load_logs()?;
        logs.sort_by(|a, b| b.action_time.cmp(&a.action_time));

        tracing::debug!(
            "Opened tracker with {} medications and {} dose logs",
            medications.len(),
            logs.len()
        );

        Ok(Self {
            repo,
            medications,
            logs,
        })
    }

    pub fn medications(&self) -> &[Medication] {
        &self.medications
    }

    /// All dose logs, newest first
    pub fn logs(&self) -> &[DoseLog] {
        &self.logs
    }

    pub fn medication(&self, id: Uuid) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    pub fn logs_for(&self, medication_id: Uuid) -> impl Iterator<Item = &DoseLog> {
        self.logs
            .iter()
            .filter(move |log| log.medication_id == medication_id)
    }

    /// Validate input, assign an identifier and store the medication
    pub fn add_medication(&mut self, input: NewMedication) -> Result<Medication> {
        let medication = validate_medication(input, Uuid::new_v4())?;
        self.repo.save_medication(&medication)?;
        self.medications.push(medication.clone());

        tracing::info!("Added medication {} ({})", medication.name, medication.id);
        Ok(medication)
    }

    /// Store already-validated medications, skipping ids that exist
    ///
    /// Used for the sample medications, which carry fixed ids.
    pub fn import_medications(&mut self, medications: &[Medication]) -> Result<usize> {
        let mut imported = 0;
        for medication in medications {
            if self.medication(medication.id).is_some() {
                continue;
            }
            self.repo.save_medication(medication)?;
            self.medications.push(medication.clone());
            imported += 1;
        }
        Ok(imported)
    }

    /// Delete a medication. Its dose logs are kept.
    pub fn remove_medication(&mut self, id: Uuid) -> Result<Medication> {
        let idx = self
            .medications
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(format!("medication {}", id)))?;

        self.repo.remove_medication(id)?;
        let removed = self.medications.remove(idx);
        tracing::info!("Removed medication {} ({})", removed.name, removed.id);
        Ok(removed)
    }

    /// Record a dose acted on at `now`
    ///
    /// The scheduled time is recorded as `now` as well; the log does not yet
    /// distinguish when a dose was due from when it was acted on.
    pub fn log_dose(
        &mut self,
        medication_id: Uuid,
        status: DoseStatus,
        now: DateTime<Utc>,
    ) -> Result<DoseLog> {
        if self.medication(medication_id).is_none() {
            return Err(Error::NotFound(format!("medication {}", medication_id)));
        }

        let log = DoseLog {
            id: Uuid::new_v4(),
            medication_id,
            scheduled_time: now,
            action_time: now,
            status,
        };

        self.repo.append_log(&log)?;
        self.logs.insert(0, log.clone());

        tracing::info!("Logged dose {} for medication {}", status, medication_id);
        Ok(log)
    }

    /// Append previously generated logs, e.g. seeded history
    ///
    /// Every log must reference a known medication; nothing is stored if
    /// any of them does not.
    pub fn record_logs(&mut self, logs: Vec<DoseLog>) -> Result<usize> {
        if let Some(orphan) = logs.iter().find(|l| self.medication(l.medication_id).is_none()) {
            return Err(Error::NotFound(format!("medication {}", orphan.medication_id)));
        }

        let count = logs.len();
        for log in logs {
            self.repo.append_log(&log)?;
            self.logs.push(log);
        }
        self.logs.sort_by(|a, b| b.action_time.cmp(&a.action_time));

        tracing::info!("Recorded {} dose logs", count);
        Ok(count)
    }

    /// Adherence over the trailing `window_days` ending at `now`
    pub fn stats(&self, now: DateTime<Utc>, window_days: u32) -> AdherenceStats {
        compute_trailing_stats(&self.logs, now, window_days)
    }

    /// Per-day counts for the last `days` calendar days in `now`'s timezone
    pub fn daily_series<Tz: TimeZone>(&self, now: &DateTime<Tz>, days: u32) -> Vec<DailyAdherence> {
        compute_daily_series(&self.logs, now, days)
    }

    /// Next dose instant for every medication, in list order
    pub fn next_doses<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<(&Medication, DateTime<Tz>)> {
        self.medications
            .iter()
            .map(|m| (m, next_dose(&m.schedule, now)))
            .collect()
    }
}
