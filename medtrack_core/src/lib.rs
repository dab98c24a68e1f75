#![forbid(unsafe_code)]

//! Core domain model and business logic for the medtrack adherence tracker.
//!
//! This crate provides:
//! - Domain types (medications, recurrence rules, dose logs, stats)
//! - Input validation
//! - Adherence calculator and next-dose projector
//! - Smart schedule suggestions via an external model
//! - Session state and persistence (memory, JSON/JSONL files)
//! - Synthetic history seeding

pub mod types;
pub mod error;
pub mod validation;
pub mod adherence;
pub mod schedule;
pub mod suggestion;
pub mod gemini;
pub mod store;
pub mod tracker;
pub mod seed;
pub mod sample;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use validation::{validate_medication, NewMedication};
pub use adherence::{adherence_summary, compute_daily_series, compute_stats, compute_trailing_stats};
pub use schedule::next_dose;
pub use suggestion::{ScheduleSuggestion, SuggestionBackend, SuggestionClient, SuggestionRequest};
pub use gemini::GeminiBackend;
pub use store::{FileRepository, MemoryRepository, Repository};
pub use tracker::Tracker;
pub use seed::seed_history;
pub use sample::{get_sample_medications, sample_medications};
pub use config::Config;
