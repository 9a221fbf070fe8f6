//! Pipeline entry points.
//!
//! - `run_check`: fetch and extract every monitored URL
//! - `calculate_diff`: classify today's dates against the prior snapshot
//! - `Pipeline::run`: check, diff, persist, report, notify

pub mod check;
pub mod diff;
#[allow(clippy::module_inception)]
pub mod pipeline;

pub use check::{CheckOutcome, DEADLINE_EXCEEDED, run_check};
pub use diff::{DiffResult, calculate_diff, diff};
pub use pipeline::{Pipeline, RunSummary};
