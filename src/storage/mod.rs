//! Storage abstractions for observation history.
//!
//! The history is one JSON document holding the last few daily snapshots.
//! It is the only state shared between runs, so a run holds the store lock
//! from `load` until `persist` has finished.
//!
//! ## Directory Structure
//!
//! ```text
//! logs/
//! ├── product_dates.json       # last_updated + history by date
//! └── product_dates.json.lock  # advisory lock held during a run
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;
use crate::models::History;

// Re-export for convenience
pub use local::LocalHistoryStore;

/// Guard serializing read-modify-write cycles across runs. Released on drop.
#[derive(Debug, Default)]
pub struct StoreLock {
    _file: Option<std::fs::File>,
}

impl StoreLock {
    /// A guard for stores that need no cross-process locking.
    pub fn none() -> Self {
        Self::default()
    }

    pub(crate) fn held(file: std::fs::File) -> Self {
        Self { _file: Some(file) }
    }
}

/// Trait for history storage backends.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Block until no other run holds the store.
    async fn lock(&self) -> Result<StoreLock> {
        Ok(StoreLock::none())
    }

    /// Read the persisted history. An absent store is an empty history.
    async fn load(&self) -> Result<History>;

    /// Atomically replace the persisted history, stamping `last_updated`.
    async fn persist(&self, history: &History, last_updated: NaiveDateTime) -> Result<()>;
}
