//! Day-over-day change detection.
//!
//! Compares today's observations against the most recent prior snapshot.
//! Only URLs present on both sides can change; new URLs are reported
//! separately and URLs that disappeared are ignored.

use crate::models::{ChangeRecord, Changes, Observations};

/// Classification of every current URL against the prior snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// URLs whose date string differs from the prior snapshot
    pub changes: Changes,
    /// URLs whose date string is the same
    pub unchanged: Vec<String>,
    /// URLs with no prior observation
    pub added: Vec<String>,
    /// No prior snapshot to compare against
    pub first_run: bool,
}

impl DiffResult {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }
}

/// Classify `current` against `previous`.
///
/// An empty `previous` is a first run: nothing is classified at all, which
/// is distinct from "everything unchanged".
pub fn calculate_diff(current: &Observations, previous: &Observations) -> DiffResult {
    if previous.is_empty() {
        return DiffResult {
            first_run: true,
            ..DiffResult::default()
        };
    }

    let mut result = DiffResult::default();
    for (url, now) in current {
        match previous.get(url) {
            Some(before) if before.date != now.date => {
                result.changes.insert(
                    url.clone(),
                    ChangeRecord {
                        old: before.date.clone(),
                        new: now.date.clone(),
                    },
                );
            }
            Some(_) => result.unchanged.push(url.clone()),
            None => result.added.push(url.clone()),
        }
    }
    result
}

/// Changed URLs only.
pub fn diff(current: &Observations, previous: &Observations) -> Changes {
    calculate_diff(current, previous).changes
}
