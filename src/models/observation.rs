//! Per-URL observation and change records.

use serde::{Deserialize, Serialize};

/// Date stamp extracted from one product page.
///
/// The day, month and year are kept verbatim as the page encodes them; they
/// are never validated as a calendar date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Observation {
    /// Matched `DDMMYYYY_HHMMSS` token
    pub raw: String,

    /// Reconstructed `DD/MM/YYYY` date string
    pub date: String,

    pub day: String,
    pub month: String,
    pub year: String,

    /// Trimmed text of the heading that carried the stamp
    pub full_text: String,
}

impl Observation {
    /// Build an observation from the captured stamp fields.
    pub fn new(
        raw: impl Into<String>,
        day: impl Into<String>,
        month: impl Into<String>,
        year: impl Into<String>,
        full_text: impl Into<String>,
    ) -> Self {
        let (day, month, year) = (day.into(), month.into(), year.into());
        Self {
            raw: raw.into(),
            date: format!("{day}/{month}/{year}"),
            day,
            month,
            year,
            full_text: full_text.into(),
        }
    }
}

/// A detected old to new date transition for one URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRecord {
    pub old: String,
    pub new: String,
}
