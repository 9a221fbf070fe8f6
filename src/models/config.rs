//! Application configuration structures.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Monitored pages and HTTP behavior
    #[serde(default)]
    pub checker: CheckerConfig,

    /// History file settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Report output settings
    #[serde(default)]
    pub report: ReportConfig,

    /// Mail credentials location
    #[serde(default)]
    pub mail: MailConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Unreadable(path.to_path_buf(), e))?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.checker.urls.is_empty() {
            return Err(ConfigError::invalid("checker.urls", "no URLs to monitor"));
        }
        for url in &self.checker.urls {
            url::Url::parse(url)
                .map_err(|e| ConfigError::invalid("checker.urls", format!("{url}: {e}")))?;
        }
        if self.checker.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("checker.user_agent", "is empty"));
        }
        if self.checker.timeout_secs == 0 {
            return Err(ConfigError::invalid("checker.timeout_secs", "must be > 0"));
        }
        if self.checker.max_attempts == 0 {
            return Err(ConfigError::invalid("checker.max_attempts", "must be >= 1"));
        }
        if self.checker.max_concurrent == 0 {
            return Err(ConfigError::invalid("checker.max_concurrent", "must be > 0"));
        }
        if self.checker.heading_tag.trim().is_empty() {
            return Err(ConfigError::invalid("checker.heading_tag", "is empty"));
        }
        if self.history.retention_days == 0 {
            return Err(ConfigError::invalid("history.retention_days", "must be > 0"));
        }
        if self.mail.timeout_secs == 0 {
            return Err(ConfigError::invalid("mail.timeout_secs", "must be > 0"));
        }
        Ok(())
    }
}

/// Monitored pages and HTTP client behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Product pages to check, in report order
    #[serde(default = "defaults::urls")]
    pub urls: Vec<String>,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Whole-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Attempts per URL (>= 1)
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit; the wait after attempt `n` is `n` units
    #[serde(default = "defaults::backoff")]
    pub backoff_secs: u64,

    /// Maximum concurrent fetches (1 = sequential)
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Deadline for the whole check phase in seconds
    #[serde(default = "defaults::run_timeout")]
    pub run_timeout_secs: u64,

    /// Heading element searched for the date stamp
    #[serde(default = "defaults::heading_tag")]
    pub heading_tag: String,

    /// Skip TLS certificate verification for monitored pages
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            urls: defaults::urls(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            connect_timeout_secs: defaults::connect_timeout(),
            max_attempts: defaults::max_attempts(),
            backoff_secs: defaults::backoff(),
            max_concurrent: defaults::max_concurrent(),
            run_timeout_secs: defaults::run_timeout(),
            heading_tag: defaults::heading_tag(),
            accept_invalid_certs: false,
        }
    }
}

/// History file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// JSON history file
    #[serde(default = "defaults::history_file")]
    pub file: PathBuf,

    /// Number of calendar days kept
    #[serde(default = "defaults::retention_days")]
    pub retention_days: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            file: defaults::history_file(),
            retention_days: defaults::retention_days(),
        }
    }
}

/// Report output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Last generated email body, overwritten every run
    #[serde(default = "defaults::debug_file")]
    pub debug_file: PathBuf,

    /// Display name used in the From header
    #[serde(default = "defaults::sender_name")]
    pub sender_name: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            debug_file: defaults::debug_file(),
            sender_name: defaults::sender_name(),
        }
    }
}

/// Where the mail credentials live and how long delivery may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// `KEY=value` file holding the SMTP settings
    #[serde(default = "defaults::env_file")]
    pub env_file: PathBuf,

    /// Bound on the whole SMTP session in seconds
    #[serde(default = "defaults::smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            env_file: defaults::env_file(),
            timeout_secs: defaults::smtp_timeout(),
        }
    }
}

/// SMTP settings read from the environment file.
#[derive(Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub recipients: Vec<String>,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl MailSettings {
    /// Read `RECIPIENT_EMAIL`, `SMTP_HOSTNAME`, `SMTP_PORT`, `SMTP_USER` and
    /// `SMTP_PASS` from a `KEY=value` file without touching the process
    /// environment.
    pub fn from_env_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }

        let iter = dotenvy::from_path_iter(path).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut pairs = Vec::new();
        for item in iter {
            pairs.push(item.map_err(|e| ConfigError::Parse(e.to_string()))?);
        }

        Self::from_pairs(pairs)
    }

    /// Build settings from already-parsed key/value pairs.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (String, String)>,
    ) -> std::result::Result<Self, ConfigError> {
        let pairs: Vec<(String, String)> = pairs.into_iter().collect();
        let get = |key: &'static str| -> std::result::Result<String, ConfigError> {
            pairs
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingKey(key))
        };

        let recipients: Vec<String> = get("RECIPIENT_EMAIL")?
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect();
        if recipients.is_empty() {
            return Err(ConfigError::MissingKey("RECIPIENT_EMAIL"));
        }

        let port = get("SMTP_PORT")?;
        let port = port
            .parse::<u16>()
            .map_err(|e| ConfigError::invalid("SMTP_PORT", format!("{port}: {e}")))?;

        Ok(Self {
            recipients,
            hostname: get("SMTP_HOSTNAME")?,
            port,
            username: get("SMTP_USER")?,
            password: get("SMTP_PASS")?,
        })
    }
}

impl fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSettings")
            .field("recipients", &self.recipients)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

mod defaults {
    use std::path::PathBuf;

    // Checker defaults
    pub fn urls() -> Vec<String> {
        vec![
            "https://assuredperformance.ie/dbsc99a".into(),
            "https://www.ebs.co.uk/dbsc99a".into(),
            "https://www.aastb.com/dbsc99a-xray".into(),
            "https://ebs-europe.nl/dbsc99a-hol".into(),
        ]
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn connect_timeout() -> u64 {
        10
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn backoff() -> u64 {
        1
    }
    pub fn max_concurrent() -> usize {
        1
    }
    pub fn run_timeout() -> u64 {
        300
    }
    pub fn heading_tag() -> String {
        "h1".into()
    }

    // History defaults
    pub fn history_file() -> PathBuf {
        PathBuf::from("logs/product_dates.json")
    }
    pub fn retention_days() -> usize {
        crate::models::DEFAULT_RETENTION_DAYS
    }

    // Report defaults
    pub fn debug_file() -> PathBuf {
        PathBuf::from("last_email.html")
    }
    pub fn sender_name() -> String {
        "Product Date Checker".into()
    }

    // Mail defaults
    pub fn env_file() -> PathBuf {
        PathBuf::from(".env")
    }
    pub fn smtp_timeout() -> u64 {
        30
    }
}
