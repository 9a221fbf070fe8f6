//! Local filesystem history store.
//!
//! Writes go to a temp file that is renamed over the target, so readers see
//! either the old or the new document. A file that fails to parse is moved
//! aside to `<file>.corrupt` and treated as a first run.
//!
//! The JSON layout matches PHP's `json_encode` with `JSON_PRETTY_PRINT` and
//! `JSON_UNESCAPED_SLASHES`, so history files written by the PHP checker
//! survive a load and persist unchanged apart from `last_updated`.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{History, HistoryFile};
use crate::storage::{HistoryStore, StoreLock};

/// JSON history file on local disk.
#[derive(Debug, Clone)]
pub struct LocalHistoryStore {
    file: PathBuf,
}

impl LocalHistoryStore {
    /// Create a store backed by the given JSON file.
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.file.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        Self::ensure_dir(&self.file).await?;

        let tmp = self.sibling(".tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.file).await?;
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.file).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Serialize with four-space indentation and `\uXXXX` escapes.
    fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let formatter = AsciiPrettyFormatter(PrettyFormatter::with_indent(b"    "));
        let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
        value.serialize(&mut serializer)?;
        Ok(bytes)
    }

    /// Load the whole document, including `last_updated`.
    pub async fn load_file(&self) -> Result<Option<HistoryFile>> {
        let Some(bytes) = self.read_bytes().await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<HistoryFile>(&bytes) {
            Ok(file) => Ok(Some(file)),
            Err(e) => {
                let aside = self.sibling(".corrupt");
                log::warn!(
                    "History file {} is unreadable ({}); moving it to {}",
                    self.file.display(),
                    e,
                    aside.display()
                );
                tokio::fs::rename(&self.file, &aside).await?;
                Ok(None)
            }
        }
    }
}

/// Pretty printer that escapes every non-ASCII character as UTF-16 `\uXXXX`.
struct AsciiPrettyFormatter<'a>(PrettyFormatter<'a>);

impl Formatter for AsciiPrettyFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

#[async_trait]
impl HistoryStore for LocalHistoryStore {
    async fn lock(&self) -> Result<StoreLock> {
        let path = self.sibling(".lock");
        Self::ensure_dir(&path).await?;

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            file.lock()?;
            Ok(file)
        })
        .await
        .map_err(|e| AppError::history(e))??;

        Ok(StoreLock::held(file))
    }

    async fn load(&self) -> Result<History> {
        match self.load_file().await? {
            Some(file) => Ok(file.history),
            None => {
                log::info!("No history found at {}", self.file.display());
                Ok(History::new())
            }
        }
    }

    async fn persist(&self, history: &History, last_updated: NaiveDateTime) -> Result<()> {
        let document = HistoryFile::new(history.clone(), last_updated);
        let bytes = Self::to_pretty_json(&document)?;
        self.write_bytes(&bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::NaiveDate;
    use tempfile::TempDir;

    use crate::models::{DailySnapshot, Observation, Observations, TIMESTAMP_FORMAT, UrlErrors};

    /// Two days as the PHP checker lays them out: URLs in fetch order, an
    /// empty error map as `[]`, non-ASCII escaped.
    const PHP_LAYOUT: &str = r#"{
    "last_updated": "2025-10-02 08:00:07",
    "history": {
        "2025-10-01": {
            "timestamp": "2025-10-01 08:00:02",
            "data": {
                "https://www.ebs.co.uk/dbsc99a": {
                    "raw": "01102025_205131",
                    "date": "01/10/2025",
                    "day": "01",
                    "month": "10",
                    "year": "2025",
                    "full_text": "DBSC99A\u2122 Caf\u00e9 01102025_205131"
                },
                "https://www.aastb.com/dbsc99a-xray": {
                    "raw": "15092025_080000",
                    "date": "15/09/2025",
                    "day": "15",
                    "month": "09",
                    "year": "2025",
                    "full_text": "X-Ray 15092025_080000"
                }
            },
            "errors": []
        },
        "2025-10-02": {
            "timestamp": "2025-10-02 08:00:05",
            "data": {
                "https://www.ebs.co.uk/dbsc99a": {
                    "raw": "02102025_101010",
                    "date": "02/10/2025",
                    "day": "02",
                    "month": "10",
                    "year": "2025",
                    "full_text": "DBSC99A 02102025_101010"
                }
            },
            "errors": {
                "https://www.aastb.com/dbsc99a-xray": "HTTP 503"
            }
        }
    }
}"#;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn sample_history() -> History {
        let mut data = Observations::new();
        data.insert(
            "https://www.ebs.co.uk/dbsc99a".to_string(),
            Observation::new("01102025_205131", "01", "10", "2025", "DBSC99A 01102025_205131"),
        );
        let mut errors = UrlErrors::new();
        errors.insert("https://ebs-europe.nl/dbsc99a-hol".to_string(), "HTTP 503".to_string());

        let mut history = History::new();
        history.append(
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            DailySnapshot::new(ts("2025-10-01 08:00:02"), data, errors),
            3,
        );
        history
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = LocalHistoryStore::new(tmp.path().join("logs/product_dates.json"));

        let history = store.load().await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = LocalHistoryStore::new(tmp.path().join("logs/product_dates.json"));
        let history = sample_history();

        store.persist(&history, ts("2025-10-01 08:00:05")).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, history);
        assert!(!store.sibling(".tmp").exists());
    }

    #[tokio::test]
    async fn test_round_trip_only_changes_last_updated() {
        let tmp = TempDir::new().unwrap();
        let store = LocalHistoryStore::new(tmp.path().join("product_dates.json"));

        store.persist(&sample_history(), ts("2025-10-01 08:00:05")).await.unwrap();
        let first = std::fs::read_to_string(store.path()).unwrap();

        let loaded = store.load().await.unwrap();
        store.persist(&loaded, ts("2025-10-01 09:30:00")).await.unwrap();
        let second = std::fs::read_to_string(store.path()).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            first.replace("2025-10-01 08:00:05", "X"),
            second.replace("2025-10-01 09:30:00", "X")
        );
    }

    #[tokio::test]
    async fn test_file_layout() {
        let tmp = TempDir::new().unwrap();
        let store = LocalHistoryStore::new(tmp.path().join("product_dates.json"));
        store.persist(&sample_history(), ts("2025-10-01 08:00:05")).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value["last_updated"], "2025-10-01 08:00:05");
        let day = &value["history"]["2025-10-01"];
        assert_eq!(day["timestamp"], "2025-10-01 08:00:02");
        assert_eq!(day["data"]["https://www.ebs.co.uk/dbsc99a"]["date"], "01/10/2025");
        assert_eq!(day["errors"]["https://ebs-europe.nl/dbsc99a-hol"], "HTTP 503");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_moved_aside() {
        let tmp = TempDir::new().unwrap();
        let store = LocalHistoryStore::new(tmp.path().join("product_dates.json"));
        std::fs::write(store.path(), b"{ not json").unwrap();

        let history = store.load().await.unwrap();

        assert!(history.is_empty());
        assert!(!store.path().exists());
        assert!(store.sibling(".corrupt").exists());
    }

    #[tokio::test]
    async fn test_php_written_file_survives_load_and_persist() {
        let tmp = TempDir::new().unwrap();
        let store = LocalHistoryStore::new(tmp.path().join("product_dates.json"));
        std::fs::write(store.path(), PHP_LAYOUT).unwrap();

        let file = store.load_file().await.unwrap().unwrap();
        let first = file.history.get(&NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()).unwrap();
        assert!(first.data["https://www.ebs.co.uk/dbsc99a"].full_text.contains("™ Café"));

        store.persist(&file.history, file.last_updated).await.unwrap();

        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), PHP_LAYOUT);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_lock_waits_while_held() {
        let tmp = TempDir::new().unwrap();
        let store = LocalHistoryStore::new(tmp.path().join("logs/product_dates.json"));

        let guard = store.lock().await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(300), store.lock()).await;
        assert!(second.is_err());

        drop(guard);
        let _again = store.lock().await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_is_released_on_drop() {
        let tmp = TempDir::new().unwrap();
        let store = LocalHistoryStore::new(tmp.path().join("logs/product_dates.json"));

        let guard = store.lock().await.unwrap();
        drop(guard);
        let _again = store.lock().await.unwrap();
    }
}
