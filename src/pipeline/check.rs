// src/pipeline/check.rs

//! Fetch-and-extract over every monitored URL.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::models::{CheckerConfig, Observation, Observations, UrlErrors};
use crate::services::{DateExtractor, MarkupParser, PageClient, RetryPolicy, fetch};

/// Error text recorded for URLs still pending when the run deadline passes.
pub const DEADLINE_EXCEEDED: &str = "run deadline exceeded";

/// Observations and per-URL failures for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub observations: Observations,
    pub errors: UrlErrors,
}

impl CheckOutcome {
    pub fn checked(&self) -> usize {
        self.observations.len() + self.errors.len()
    }
}

/// Check one URL under the shared run deadline.
async fn check_url<P: MarkupParser>(
    client: &dyn PageClient,
    extractor: &DateExtractor<P>,
    policy: &RetryPolicy,
    url: &str,
    deadline: Instant,
) -> Result<Observation, String> {
    log::info!("Checking: {}", url);

    let body = match tokio::time::timeout_at(deadline, fetch(client, url, policy)).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            log::warn!("  ✗ Error: {} (after {} attempt(s)), skipping", e, e.attempts());
            return Err(e.to_string());
        }
        Err(_) => {
            log::warn!("  ✗ Error: {}", DEADLINE_EXCEEDED);
            return Err(DEADLINE_EXCEEDED.to_string());
        }
    };

    match extractor.extract(&body) {
        Ok(observation) => {
            log::info!(
                "  ✓ Date found: {} (Raw: {})",
                observation.date,
                observation.raw
            );
            Ok(observation)
        }
        Err(e) => {
            log::warn!("  ✗ {}", e);
            Err(e.to_string())
        }
    }
}

/// Check every configured URL.
///
/// Up to `max_concurrent` URLs are in flight at once; results are joined in
/// configured order. Each job is cancelled once `run_timeout_secs` elapses.
pub async fn run_check<P: MarkupParser>(
    config: &CheckerConfig,
    client: &dyn PageClient,
    extractor: &DateExtractor<P>,
) -> CheckOutcome {
    let policy = RetryPolicy::from_config(config);
    let deadline = Instant::now() + Duration::from_secs(config.run_timeout_secs);
    let concurrency = config.max_concurrent.max(1);

    let results: Vec<(&String, Result<Observation, String>)> = stream::iter(&config.urls)
        .map(|url| {
            let policy = &policy;
            async move {
                let result = check_url(client, extractor, policy, url, deadline).await;
                (url, result)
            }
        })
        .buffered(concurrency)
        .collect()
        .await;

    let mut outcome = CheckOutcome::default();
    for (url, result) in results {
        match result {
            Ok(observation) => {
                outcome.observations.insert(url.clone(), observation);
            }
            Err(error) => {
                outcome.errors.insert(url.clone(), error);
            }
        }
    }
    outcome
}
