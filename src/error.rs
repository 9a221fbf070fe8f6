// src/error.rs

//! Unified error handling for the date checker.
//!
//! Per-URL failures (`FetchError`, `ExtractionError`) are recorded into the
//! run's error map and never abort a run. `NotifyError` is logged at the top
//! level. None of these reach `AppError`. `ConfigError` is the only fatal
//! kind.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// History store error
    #[error("History error: {0}")]
    History(String),
}

impl AppError {
    /// Create a history store error.
    pub fn history(message: impl fmt::Display) -> Self {
        Self::History(message.to_string())
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// A single failed retrieval attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Connection, TLS, timeout or body read failure
    #[error("{0}")]
    Transport(String),

    /// Non-success status code
    #[error("HTTP {0}")]
    Status(u16),

    /// Success status with nothing in the body
    #[error("unknown error")]
    EmptyBody,
}

/// Page retrieval failed after the whole attempt budget was spent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{last}")]
    RetriesExhausted { attempts: u32, last: FetchFailure },
}

impl FetchError {
    /// The failure reported by the final attempt.
    pub fn last_failure(&self) -> &FetchFailure {
        match self {
            Self::RetriesExhausted { last, .. } => last,
        }
    }

    /// Number of attempts performed.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::RetriesExhausted { attempts, .. } => *attempts,
        }
    }
}

/// Date stamp extraction failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Date not found in HTML")]
    NotFound,
}

/// Notification delivery failed.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("SMTP connection error: {0}")]
    Connect(#[source] std::io::Error),

    #[error("SMTP TLS error: {0}")]
    Tls(String),

    #[error("SMTP I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SMTP protocol error: {0}")]
    Protocol(String),

    #[error("SMTP authentication failed: {0}")]
    AuthFailed(String),

    #[error("{stage} failed: {reply}")]
    Rejected { stage: &'static str, reply: String },

    #[error("No recipients accepted by server")]
    NoRecipientsAccepted,

    #[error("SMTP session timed out")]
    Timeout,
}

impl NotifyError {
    /// Create a protocol error.
    pub fn protocol(message: impl fmt::Display) -> Self {
        Self::Protocol(message.to_string())
    }
}

/// Missing or invalid configuration. Fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found at {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Could not read config file {}: {}", .0.display(), .1)]
    Unreadable(PathBuf, #[source] std::io::Error),

    #[error("Missing required config key {0}")]
    MissingKey(&'static str),

    #[error("Invalid config value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Config parse error: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Create an invalid-value error.
    pub fn invalid(key: &'static str, message: impl fmt::Display) -> Self {
        Self::Invalid {
            key,
            message: message.to_string(),
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(ConfigError::Parse(e.to_string()))
    }
}
