// src/pipeline/pipeline.rs

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::Result;
use crate::models::{Config, DailySnapshot, History, Observations};
use crate::notify::{Message, Notifier, Report};
use crate::services::DateExtractor;
use crate::services::PageClient;
use crate::storage::HistoryStore;

use super::check::{CheckOutcome, run_check};
use super::diff::{DiffResult, calculate_diff};

/// Collaborators for one run.
pub struct Pipeline<'a> {
    pub config: &'a Config,
    pub client: &'a dyn PageClient,
    pub store: &'a dyn HistoryStore,
    /// `None` skips delivery; the debug report is still written
    pub notifier: Option<&'a dyn Notifier>,
}

/// What one run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub monitored: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub added: usize,
    pub errored: usize,
    pub first_run: bool,
    /// Date of the snapshot compared against
    pub compared_with: Option<NaiveDate>,
    pub persisted: bool,
    pub notified: bool,
}

impl Pipeline<'_> {
    /// Run the full pipeline: check, diff, persist, report, notify.
    ///
    /// Only a configuration error fails the run. Fetch, extraction, history
    /// and delivery problems are logged and reflected in the summary.
    pub async fn run(&self, now: NaiveDateTime) -> Result<RunSummary> {
        let config = self.config;
        let today = now.date();
        log::info!("=== Product Date Checker ===");
        log::info!("Started at: {}", now.format("%Y-%m-%d %H:%M:%S"));

        let extractor = DateExtractor::new(&config.checker.heading_tag)?;

        // Step 1: fetch and extract
        let outcome = run_check(&config.checker, self.client, &extractor).await;

        // Step 2-4: compare, append, persist under the store lock
        let (previous, compared_with, diff, persisted) = self.update_history(&outcome, now).await;

        let mut summary = RunSummary {
            date: today,
            monitored: outcome.observations.len(),
            changed: diff.change_count(),
            unchanged: outcome.observations.len() - diff.change_count(),
            added: diff.added.len(),
            errored: outcome.errors.len(),
            first_run: diff.first_run,
            compared_with,
            persisted,
            notified: false,
        };

        // Step 5: report and notify
        if outcome.observations.is_empty() {
            log::error!("✗ No data to report. Email not sent.");
        } else {
            let report = Report::build(&diff.changes, &outcome.observations, &previous, now);
            let message = Message::from_report(&report);
            write_debug_report(&config.report.debug_file, &message.html_body).await;
            summary.notified = self.notify(&message).await;
        }

        log_summary(&summary);
        Ok(summary)
    }

    async fn update_history(
        &self,
        outcome: &CheckOutcome,
        now: NaiveDateTime,
    ) -> (Observations, Option<NaiveDate>, DiffResult, bool) {
        let today = now.date();

        let lock = match self.store.lock().await {
            Ok(lock) => Some(lock),
            Err(e) => {
                log::error!("Could not lock history store: {}", e);
                None
            }
        };

        let loaded = match &lock {
            Some(_) => self.store.load().await.map_err(|e| {
                log::error!("Could not load history: {}", e);
            }),
            None => Err(()),
        };
        let can_persist = loaded.is_ok();
        let mut history = loaded.unwrap_or_default();

        let (previous, compared_with) = match history.most_recent_prior(today) {
            Some((date, snapshot)) => (snapshot.data.clone(), Some(date)),
            None => (Observations::new(), None),
        };

        let diff = calculate_diff(&outcome.observations, &previous);
        log_diff(&diff, &outcome.observations, &previous, compared_with);

        let persisted = if outcome.observations.is_empty() {
            log::warn!("No observations this run; history left untouched");
            false
        } else if !can_persist {
            log::error!("History unavailable; today's snapshot was not saved");
            false
        } else {
            self.persist_snapshot(&mut history, outcome, now).await
        };

        (previous, compared_with, diff, persisted)
    }

    async fn persist_snapshot(
        &self,
        history: &mut History,
        outcome: &CheckOutcome,
        now: NaiveDateTime,
    ) -> bool {
        let snapshot = DailySnapshot::new(
            now,
            outcome.observations.clone(),
            outcome.errors.clone(),
        );
        let dropped = history.append(now.date(), snapshot, self.config.history.retention_days);
        for date in dropped {
            log::debug!("Dropped snapshot {} from history", date);
        }

        match self.store.persist(history, now).await {
            Ok(()) => {
                log::info!(
                    "✓ Data logged to: {} ({} day(s) kept)",
                    self.config.history.file.display(),
                    history.len()
                );
                true
            }
            Err(e) => {
                log::error!("✗ Failed to save history: {}", e);
                false
            }
        }
    }

    async fn notify(&self, message: &Message) -> bool {
        let Some(notifier) = self.notifier else {
            log::info!("Email delivery skipped");
            return false;
        };

        log::info!("Sending email notification...");
        match notifier.send(message).await {
            Ok(delivery) => {
                log::info!(
                    "✓ Email sent successfully to: {}",
                    delivery.accepted.join(", ")
                );
                true
            }
            Err(e) => {
                log::error!("✗ Failed to send email: {}", e);
                false
            }
        }
    }
}

fn log_diff(
    diff: &DiffResult,
    current: &Observations,
    previous: &Observations,
    compared_with: Option<NaiveDate>,
) {
    let Some(date) = compared_with.filter(|_| !diff.first_run) else {
        log::info!("No previous data found. This is the first run.");
        return;
    };

    log::info!("Comparing with data from {}...", date);
    for (url, change) in &diff.changes {
        log::warn!("  ⚠ CHANGED: {}", url);
        log::warn!("    Old: {}", change.old);
        log::warn!("    New: {}", change.new);
    }
    for url in &diff.unchanged {
        if let Some(obs) = current.get(url) {
            log::info!("  ✓ Unchanged: {} ({})", url, obs.date);
        }
    }
    for url in &diff.added {
        if let Some(obs) = current.get(url) {
            log::info!("  ℹ New URL: {} ({})", url, obs.date);
        }
    }
    log::debug!("{} URL(s) in the prior snapshot", previous.len());
}

async fn write_debug_report(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                log::warn!("Could not create {}: {}", parent.display(), e);
                return;
            }
        }
    }
    match tokio::fs::write(path, body).await {
        Ok(()) => log::info!("  ℹ Email HTML saved to: {}", path.display()),
        Err(e) => log::warn!("Could not write {}: {}", path.display(), e),
    }
}

fn log_summary(summary: &RunSummary) {
    log::info!("[SUMMARY] Run for {}", summary.date);
    log::info!("    Monitored: {}", summary.monitored);
    log::info!("    Changed: {}", summary.changed);
    log::info!("    Unchanged: {}", summary.unchanged);
    log::info!("    Errored: {}", summary.errored);
    log::info!("    History saved: {}", summary.persisted);
    log::info!("    Email sent: {}", summary.notified);
}
