//! Starter medications shown on a fresh install.

use crate::validation::{validate_medication, NewMedication};
use crate::{Medication, MedicationForm, ScheduleKind};
use once_cell::sync::Lazy;
use uuid::Uuid;

/// Fixed ids so seeded sample data is stable across runs
const LISINOPRIL_ID: Uuid = Uuid::from_u128(0x6d65_6431_0000_4000_8000_0000_0000_0001);
const METFORMIN_ID: Uuid = Uuid::from_u128(0x6d65_6432_0000_4000_8000_0000_0000_0002);
const AMOXICILLIN_ID: Uuid = Uuid::from_u128(0x6d65_6433_0000_4000_8000_0000_0000_0003);

static SAMPLE_MEDICATIONS: Lazy<Vec<Medication>> = Lazy::new(build_sample_medications);

/// Cached sample medications
pub fn get_sample_medications() -> &'static [Medication] {
    &SAMPLE_MEDICATIONS
}

/// Owned copy of the sample medications
pub fn sample_medications() -> Vec<Medication> {
    SAMPLE_MEDICATIONS.clone()
}

fn build_sample_medications() -> Vec<Medication> {
    let inputs = [
        (
            LISINOPRIL_ID,
            NewMedication::daily("Lisinopril", "10mg", MedicationForm::Pill, &["08:00"])
                .with_instructions("Take with a full glass of water."),
        ),
        (
            METFORMIN_ID,
            NewMedication::daily("Metformin", "500mg", MedicationForm::Pill, &["09:00", "21:00"]),
        ),
        (
            AMOXICILLIN_ID,
            NewMedication::daily(
                "Amoxicillin",
                "250mg",
                MedicationForm::Liquid,
                &["07:00", "15:00", "23:00"],
            )
            .with_kind(ScheduleKind::Interval { interval_days: 1 })
            .with_instructions("Finish the entire course. Shake well before use."),
        ),
    ];

    inputs
        .into_iter()
        .filter_map(|(id, input)| match validate_medication(input, id) {
            Ok(med) => Some(med),
            Err(e) => {
                tracing::error!("Invalid sample medication: {}", e);
                None
            }
        })
        .collect()
}
