//! Rate-limited HTTP client used by the remote repository tree.
//!
//! The SEC's fair-access guidelines cap automated traffic at 10 requests per
//! second; this client enforces that with a token-bucket rate limiter, so
//! callers never have to throttle manually. Rate-limit responses (HTTP 429)
//! and transport failures are retried a bounded number of times with
//! exponential backoff and jitter; all other statuses are handed back to the
//! caller, because what a non-200 means depends on the call site (a missing
//! remote artifact is routine for `exists`, fatal for a streamed copy).

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
    state::NotKeyed,
};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use tokio::time::sleep;

use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 1000;

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// HTTP client with built-in rate limiting and bounded retries.
///
/// Cheap to clone; clones share the same rate limiter, so the request budget
/// holds across every handle derived from one configuration.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    rate_limiter: Arc<Governor>,
}

impl HttpClient {
    /// Builds a client from the configuration's user agent, header map,
    /// timeout, and rate limit.
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| MirrorError::Config(format!("invalid user agent: {e}")))?,
        );
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| MirrorError::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| MirrorError::Config(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| MirrorError::Config(format!("failed to build HTTP client: {e}")))?;

        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(config.rate_limit).ok_or_else(|| {
                MirrorError::Config("rate limit must be greater than zero".to_string())
            })?,
        )));

        Ok(HttpClient {
            client,
            rate_limiter,
        })
    }

    /// Exponential backoff with ±20% jitter: `(2^retry × 1000ms) ± 20%`.
    fn calculate_backoff(retry: u32) -> Duration {
        let backoff_ms = INITIAL_BACKOFF_MS * (2_u64.pow(retry));
        let jitter = (backoff_ms as f64 * 0.2 * (fastrand::f64() - 0.5)) as i64;
        Duration::from_millis((backoff_ms as i64 + jitter) as u64)
    }

    /// Issues a `HEAD` request and returns the status code.
    pub async fn head(&self, url: &str) -> Result<StatusCode> {
        let response = self.execute(|| self.client.head(url), url).await?;
        Ok(response.status())
    }

    /// Issues a `GET` request and returns the response with its body
    /// unconsumed, ready for streaming. Statuses other than 429 are returned
    /// as-is for the caller to interpret.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.execute(|| self.client.get(url), url).await
    }

    async fn execute<F>(&self, make_request: F, url: &str) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retries = 0;
        loop {
            self.rate_limiter.until_ready().await;

            match make_request().send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if retries >= MAX_RETRIES {
                        return Err(MirrorError::RateLimitExceeded);
                    }
                    let wait = response
                        .headers()
                        .get("retry-after")
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| Self::calculate_backoff(retries));
                    tracing::warn!(
                        url,
                        attempt = retries + 1,
                        max = MAX_RETRIES + 1,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited (429), backing off"
                    );
                    sleep(wait).await;
                    retries += 1;
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    if retries >= MAX_RETRIES {
                        return Err(MirrorError::Transport(e));
                    }
                    let wait = Self::calculate_backoff(retries);
                    tracing::warn!(
                        url,
                        error = %e,
                        attempt = retries + 1,
                        max = MAX_RETRIES + 1,
                        "request failed, retrying"
                    );
                    sleep(wait).await;
                    retries += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_with_jitter() {
        let backoff0 = HttpClient::calculate_backoff(0);
        let backoff1 = HttpClient::calculate_backoff(1);
        let backoff2 = HttpClient::calculate_backoff(2);

        assert!(backoff0 < backoff1);
        assert!(backoff1 < backoff2);

        assert!(backoff0.as_millis() >= 800 && backoff0.as_millis() <= 1200);
        assert!(backoff1.as_millis() >= 1600 && backoff1.as_millis() <= 2400);
        assert!(backoff2.as_millis() >= 3200 && backoff2.as_millis() <= 4800);
    }

    #[test]
    fn client_rejects_zero_rate_limit() {
        let config = MirrorConfig {
            rate_limit: 0,
            ..MirrorConfig::default()
        };
        assert!(matches!(
            HttpClient::new(&config),
            Err(MirrorError::Config(_))
        ));
    }
}
