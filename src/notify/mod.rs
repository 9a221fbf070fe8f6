//! Report delivery.
//!
//! Notification runs after the history has been persisted and its failure
//! never touches the stored history.

pub mod report;
pub mod smtp;

use async_trait::async_trait;

use crate::error::NotifyError;

pub use report::{Report, ReportRow};
pub use smtp::SmtpNotifier;

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub html_body: String,
}

impl Message {
    pub fn from_report(report: &Report) -> Self {
        Self {
            subject: report.subject(),
            html_body: report.render_html(),
        }
    }
}

/// Recipients the server accepted or refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub accepted: Vec<String>,
    /// Recipient and the server's reply
    pub rejected: Vec<(String, String)>,
}

/// Trait for notification backends.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message`. Succeeds when at least one recipient accepted it.
    async fn send(&self, message: &Message) -> Result<Delivery, NotifyError>;
}
