//! Core domain types for the medication tracker.
//!
//! This module defines the data contract shared by every other module:
//! - Medications and their recurrence rules
//! - Dose logs (append-only adherence events)
//! - Derived adherence statistics

use crate::Error;
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Medication Types
// ============================================================================

/// Physical form of a medication
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MedicationForm {
    Pill,
    Liquid,
    Injection,
    Other,
}

impl MedicationForm {
    pub const ALL: [MedicationForm; 4] = [
        MedicationForm::Pill,
        MedicationForm::Liquid,
        MedicationForm::Injection,
        MedicationForm::Other,
    ];
}

impl fmt::Display for MedicationForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pill => write!(f, "pill"),
            Self::Liquid => write!(f, "liquid"),
            Self::Injection => write!(f, "injection"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl FromStr for MedicationForm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pill" => Ok(Self::Pill),
            "liquid" => Ok(Self::Liquid),
            "injection" => Ok(Self::Injection),
            "other" => Ok(Self::Other),
            other => Err(Error::validation(
                "form",
                format!("unknown form '{}' (expected pill, liquid, injection or other)", other),
            )),
        }
    }
}

/// A time of day in 24-hour `HH:MM` form
///
/// Parsing is strict: exactly two digits for hours (00-23), a colon,
/// and two digits for minutes (00-59).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Build from hour and minute, returning None when out of range
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::validation("time", format!("'{}' is not a valid HH:MM time", s));

        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(invalid());
        }
        let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }

        let hour = u32::from(digits[0] - b'0') * 10 + u32::from(digits[1] - b'0');
        let minute = u32::from(digits[2] - b'0') * 10 + u32::from(digits[3] - b'0');
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }

        Self::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Recurrence pattern of a schedule
///
/// Serialized with a `type` tag so the JSON shape is
/// `{"type": "weekly", "days": [1, 3]}` or `{"type": "interval", "intervalDays": 2}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleKind {
    Daily,
    /// Weekday indices, 0 = Sunday through 6 = Saturday
    Weekly { days: Vec<u8> },
    Interval {
        #[serde(rename = "intervalDays")]
        interval_days: u32,
    },
}

impl ScheduleKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly { .. } => "weekly",
            Self::Interval { .. } => "interval",
        }
    }
}

/// A medication's recurrence rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleRule {
    #[serde(flatten)]
    pub kind: ScheduleKind,
    /// Times of day, in the order the user entered them. Never empty.
    pub times: Vec<TimeOfDay>,
}

impl ScheduleRule {
    pub fn daily(times: Vec<TimeOfDay>) -> Self {
        Self {
            kind: ScheduleKind::Daily,
            times,
        }
    }
}

/// A medication the user is tracking
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    pub dosage: String,
    pub form: MedicationForm,
    pub schedule: ScheduleRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ============================================================================
// Dose Log Types
// ============================================================================

/// Outcome of a scheduled dose
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Taken,
    Skipped,
}

impl fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Taken => write!(f, "taken"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// A single recorded dose event. Append-only: never mutated once created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DoseLog {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub scheduled_time: DateTime<Utc>,
    pub action_time: DateTime<Utc>,
    pub status: DoseStatus,
}

// ============================================================================
// Derived Types
// ============================================================================

/// Aggregate adherence over a window of dose logs
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceStats {
    pub total_doses: u32,
    pub taken_doses: u32,
    pub skipped_doses: u32,
    /// round(taken / total * 100), or 100 when nothing was due
    pub adherence_percentage: u8,
}

/// Taken/skipped counts for one local calendar date
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyAdherence {
    pub date: NaiveDate,
    pub taken: u32,
    pub skipped: u32,
}

impl DailyAdherence {
    pub fn total(&self) -> u32 {
        self.taken + self.skipped
    }
}
