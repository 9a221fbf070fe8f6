// src/services/fetcher.rs

//! Page retrieval with bounded retries and linear backoff.
//!
//! `fetch` depends only on its arguments, so callers may run it for many
//! URLs at once without shared state.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FetchError, FetchFailure, Result};
use crate::models::CheckerConfig;
use crate::utils::http::create_async_client;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

/// Transport used to retrieve product pages.
#[async_trait]
pub trait PageClient: Send + Sync {
    /// Perform one GET. `Err` carries a transport-level failure message.
    async fn get(&self, url: &str) -> std::result::Result<PageResponse, String>;
}

/// Production page client backed by `reqwest`.
#[derive(Clone)]
pub struct HttpPageClient {
    client: reqwest::Client,
}

impl HttpPageClient {
    /// Build a client from the checker settings.
    pub fn new(config: &CheckerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }
}

#[async_trait]
impl PageClient for HttpPageClient {
    async fn get(&self, url: &str) -> std::result::Result<PageResponse, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(PageResponse { status, body })
    }
}

/// Attempt budget and backoff unit for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    pub fn from_config(config: &CheckerConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_secs(config.backoff_secs))
    }

    /// Wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Classify one response. Success needs a 2xx status and a non-empty body.
fn classify(response: PageResponse) -> std::result::Result<String, FetchFailure> {
    if !(200..300).contains(&response.status) {
        return Err(FetchFailure::Status(response.status));
    }
    if response.body.is_empty() {
        return Err(FetchFailure::EmptyBody);
    }
    Ok(response.body)
}

/// Fetch `url`, retrying up to `policy.max_attempts` times.
///
/// After failed attempt `n` the task sleeps `n` backoff units; there is no
/// wait after the final attempt. Never panics; the last failure is returned.
pub async fn fetch(
    client: &dyn PageClient,
    url: &str,
    policy: &RetryPolicy,
) -> std::result::Result<String, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let failure = match client.get(url).await {
            Ok(response) => match classify(response) {
                Ok(body) => return Ok(body),
                Err(failure) => failure,
            },
            Err(message) => FetchFailure::Transport(message),
        };

        if attempt >= max_attempts {
            return Err(FetchError::RetriesExhausted {
                attempts: attempt,
                last: failure,
            });
        }

        let delay = policy.delay_after(attempt);
        log::debug!(
            "Attempt {}/{} for {} failed: {}; retrying in {:?}",
            attempt,
            max_attempts,
            url,
            failure,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed sequence of outcomes, one per call.
    struct ScriptedClient {
        script: Mutex<VecDeque<std::result::Result<PageResponse, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(script: Vec<std::result::Result<PageResponse, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageClient for ScriptedClient {
        async fn get(&self, _url: &str) -> std::result::Result<PageResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".into()))
        }
    }

    fn ok(body: &str) -> std::result::Result<PageResponse, String> {
        Ok(PageResponse {
            status: 200,
            body: body.into(),
        })
    }

    fn status(code: u16) -> std::result::Result<PageResponse, String> {
        Ok(PageResponse {
            status: code,
            body: "error page".into(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_after_two_waits() {
        let client = ScriptedClient::new(vec![
            Err("connection reset".into()),
            status(502),
            ok("<h1>ok</h1>"),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        let body = fetch(&client, "https://example.com", &policy).await.unwrap();

        assert_eq!(body, "<h1>ok</h1>");
        assert_eq!(client.calls(), 3);
        // Waits of 1 and 2 units.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reports_last_failure_without_final_wait() {
        let client = ScriptedClient::new(vec![
            Err("timed out".into()),
            Err("timed out".into()),
            status(503),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        let err = fetch(&client, "https://example.com", &policy).await.unwrap_err();

        assert_eq!(err.attempts(), 3);
        assert_eq!(err.last_failure(), &FetchFailure::Status(503));
        assert_eq!(err.to_string(), "HTTP 503");
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_single_attempt_never_waits() {
        let client = ScriptedClient::new(vec![Err("dns failure".into())]);
        let policy = RetryPolicy::new(1, Duration::from_secs(60));

        let err = fetch(&client, "https://example.com", &policy).await.unwrap_err();

        assert_eq!(client.calls(), 1);
        assert_eq!(err.last_failure(), &FetchFailure::Transport("dns failure".into()));
    }

    #[tokio::test]
    async fn test_empty_body_is_failure() {
        let client = ScriptedClient::new(vec![ok(""), ok("")]);
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let err = fetch(&client, "https://example.com", &policy).await.unwrap_err();

        assert_eq!(err.last_failure(), &FetchFailure::EmptyBody);
        assert_eq!(err.to_string(), "unknown error");
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(4, Duration::from_millis(500));
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(3), Duration::from_millis(1500));
    }
}
