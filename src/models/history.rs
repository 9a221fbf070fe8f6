//! Daily snapshots and the retention-bounded history.
//!
//! ## File format
//!
//! ```text
//! {
//!     "last_updated": "2025-10-02 08:00:03",
//!     "history": {
//!         "2025-10-01": {
//!             "timestamp": "2025-10-01 08:00:02",
//!             "data": { "<url>": { "raw", "date", "day", "month", "year", "full_text" } },
//!             "errors": { "<url>": "HTTP 503" }
//!         }
//!     }
//! }
//! ```
//!
//! Date keys are `YYYY-MM-DD`, so key order is chronological order. URL keys
//! keep the order they were written in, and an empty `data` or `errors` map
//! stored as `[]` is written back as `[]`.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::ser::{SerializeSeq, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};

use crate::models::{Observation, Observations, UrlErrors};

/// Number of calendar days kept by default.
pub const DEFAULT_RETENTION_DAYS: usize = 3;

/// Timestamp layout used throughout the history file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// All observations and errors for one calendar day.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(try_from = "StoredSnapshot")]
pub struct DailySnapshot {
    /// When the check ran
    pub timestamp: NaiveDateTime,

    /// URL to extracted date
    pub data: Observations,

    /// URL to failure description
    pub errors: UrlErrors,

    listed: EmptyAsList,
}

/// Which empty maps were read as `[]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EmptyAsList {
    data: bool,
    errors: bool,
}

impl DailySnapshot {
    pub fn new(timestamp: NaiveDateTime, data: Observations, errors: UrlErrors) -> Self {
        Self {
            timestamp,
            data,
            errors,
            listed: EmptyAsList::default(),
        }
    }
}

impl Serialize for DailySnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DailySnapshot", 3)?;
        state.serialize_field("timestamp", &self.timestamp.format(TIMESTAMP_FORMAT).to_string())?;
        state.serialize_field("data", &StoredMap::new(&self.data, self.listed.data))?;
        state.serialize_field("errors", &StoredMap::new(&self.errors, self.listed.errors))?;
        state.end()
    }
}

/// Write side of a URL map: the map itself, or `[]` when it was read that way.
enum StoredMap<'a, V> {
    Map(&'a IndexMap<String, V>),
    EmptyList,
}

impl<'a, V> StoredMap<'a, V> {
    fn new(map: &'a IndexMap<String, V>, listed: bool) -> Self {
        if listed && map.is_empty() {
            Self::EmptyList
        } else {
            Self::Map(map)
        }
    }
}

impl<V: Serialize> Serialize for StoredMap<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Map(map) => map.serialize(serializer),
            Self::EmptyList => serializer.serialize_seq(Some(0))?.end(),
        }
    }
}

/// Read side of a snapshot.
#[derive(Deserialize)]
struct StoredSnapshot {
    #[serde(with = "timestamp")]
    timestamp: NaiveDateTime,

    #[serde(default)]
    data: MapOrList<Observation>,

    #[serde(default)]
    errors: MapOrList<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MapOrList<V> {
    Map(IndexMap<String, V>),
    List(Vec<serde::de::IgnoredAny>),
}

impl<V> Default for MapOrList<V> {
    fn default() -> Self {
        Self::Map(IndexMap::new())
    }
}

impl<V> MapOrList<V> {
    /// The map, and whether it was stored as an empty list.
    fn into_map(self, field: &str) -> Result<(IndexMap<String, V>, bool), String> {
        match self {
            Self::Map(map) => Ok((map, false)),
            Self::List(items) if items.is_empty() => Ok((IndexMap::new(), true)),
            Self::List(_) => Err(format!("`{field}` must be an object")),
        }
    }
}

impl TryFrom<StoredSnapshot> for DailySnapshot {
    type Error = String;

    fn try_from(stored: StoredSnapshot) -> Result<Self, Self::Error> {
        let (data, data_listed) = stored.data.into_map("data")?;
        let (errors, errors_listed) = stored.errors.into_map("errors")?;
        Ok(Self {
            timestamp: stored.timestamp,
            data,
            errors,
            listed: EmptyAsList {
                data: data_listed,
                errors: errors_listed,
            },
        })
    }
}

/// Snapshots keyed by the calendar date the check ran.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct History {
    snapshots: BTreeMap<NaiveDate, DailySnapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&DailySnapshot> {
        self.snapshots.get(date)
    }

    /// Stored dates, oldest first.
    pub fn dates(&self) -> impl DoubleEndedIterator<Item = &NaiveDate> {
        self.snapshots.keys()
    }

    /// Snapshots, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&NaiveDate, &DailySnapshot)> {
        self.snapshots.iter()
    }

    /// The snapshot with the greatest date other than `today`.
    ///
    /// This is the latest earlier run, which may be several days back when
    /// intervening days were skipped.
    pub fn most_recent_prior(&self, today: NaiveDate) -> Option<(NaiveDate, &DailySnapshot)> {
        self.snapshots
            .iter()
            .rev()
            .find(|(date, _)| **date != today)
            .map(|(date, snapshot)| (*date, snapshot))
    }

    /// Insert or overwrite the snapshot for `date`, then keep only the
    /// `retention` greatest dates. Returns the dates that were dropped.
    pub fn append(
        &mut self,
        date: NaiveDate,
        snapshot: DailySnapshot,
        retention: usize,
    ) -> Vec<NaiveDate> {
        self.snapshots.insert(date, snapshot);

        let mut dropped = Vec::new();
        while self.snapshots.len() > retention.max(1) {
            match self.snapshots.pop_first() {
                Some((old, _)) => dropped.push(old),
                None => break,
            }
        }
        dropped
    }
}

/// The persisted representation: last-updated stamp plus the full history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryFile {
    #[serde(with = "timestamp")]
    pub last_updated: NaiveDateTime,

    #[serde(default)]
    pub history: History,
}

impl HistoryFile {
    pub fn new(history: History, last_updated: NaiveDateTime) -> Self {
        Self {
            last_updated,
            history,
        }
    }
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
