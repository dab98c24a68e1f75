//! Input validation at the medication construction boundary.
//!
//! Presentation layers hand over raw user input as a [`NewMedication`];
//! [`validate_medication`] either returns a well-formed [`Medication`] or a
//! field-level [`Error::Validation`]. Nothing downstream of this module
//! re-checks these invariants.

use crate::{Error, Medication, MedicationForm, Result, ScheduleKind, ScheduleRule, TimeOfDay};
use uuid::Uuid;

/// Raw medication input as entered by the user
#[derive(Clone, Debug)]
pub struct NewMedication {
    pub name: String,
    pub dosage: String,
    pub form: MedicationForm,
    pub kind: ScheduleKind,
    /// Times of day as entered, e.g. `["08:00", "20:00"]`
    pub times: Vec<String>,
    pub instructions: Option<String>,
}

impl NewMedication {
    /// A daily medication, the shape the add-medication form produces
    pub fn daily(
        name: impl Into<String>,
        dosage: impl Into<String>,
        form: MedicationForm,
        times: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            dosage: dosage.into(),
            form,
            kind: ScheduleKind::Daily,
            times: times.iter().map(|t| t.to_string()).collect(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_kind(mut self, kind: ScheduleKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Validate raw input and build a medication with the given identifier
pub fn validate_medication(input: NewMedication, id: Uuid) -> Result<Medication> {
    let name = required_text("name", &input.name)?;
    let dosage = required_text("dosage", &input.dosage)?;
    let times = parse_times(&input.times)?;
    let kind = validate_kind(input.kind)?;

    let instructions = input
        .instructions
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(Medication {
        id,
        name,
        dosage,
        form: input.form,
        schedule: ScheduleRule { kind, times },
        instructions,
    })
}

/// Parse and check a list of `HH:MM` strings, preserving order
pub fn parse_times(raw: &[String]) -> Result<Vec<TimeOfDay>> {
    if raw.is_empty() {
        return Err(Error::validation(
            "schedule.times",
            "at least one time of day is required",
        ));
    }

    let mut times: Vec<TimeOfDay> = Vec::with_capacity(raw.len());
    for (idx, s) in raw.iter().enumerate() {
        let field = format!("schedule.times[{}]", idx);
        let time: TimeOfDay = s
            .trim()
            .parse()
            .map_err(|_| Error::validation(&field, format!("'{}' is not a valid HH:MM time", s)))?;

        if times.contains(&time) {
            return Err(Error::validation(field, format!("{} is listed twice", time)));
        }
        times.push(time);
    }

    Ok(times)
}

fn validate_kind(kind: ScheduleKind) -> Result<ScheduleKind> {
    match kind {
        ScheduleKind::Daily => Ok(ScheduleKind::Daily),
        ScheduleKind::Weekly { mut days } => {
            if days.is_empty() {
                return Err(Error::validation(
                    "schedule.days",
                    "weekly schedules need at least one weekday",
                ));
            }
            if let Some(bad) = days.iter().find(|d| **d > 6) {
                return Err(Error::validation(
                    "schedule.days",
                    format!("{} is not a weekday index (0 = Sunday .. 6 = Saturday)", bad),
                ));
            }
            days.sort_unstable();
            days.dedup();
            Ok(ScheduleKind::Weekly { days })
        }
        ScheduleKind::Interval { interval_days } => {
            if interval_days == 0 {
                return Err(Error::validation(
                    "schedule.intervalDays",
                    "interval must be at least one day",
                ));
            }
            Ok(ScheduleKind::Interval { interval_days })
        }
    }
}

fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(field, format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}
