// src/models/mod.rs

//! Domain models for the date checker.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod history;
mod observation;

// Re-export all public types
pub use config::{CheckerConfig, Config, HistoryConfig, MailConfig, MailSettings, ReportConfig};
pub use history::{DEFAULT_RETENTION_DAYS, DailySnapshot, History, HistoryFile, TIMESTAMP_FORMAT};
pub use observation::{ChangeRecord, Observation};

use indexmap::IndexMap;

/// URL to observation for one run, in configured order.
pub type Observations = IndexMap<String, Observation>;

/// URL to detected change.
pub type Changes = IndexMap<String, ChangeRecord>;

/// URL to failure description.
pub type UrlErrors = IndexMap<String, String>;
