//! Authenticated, paced GET execution against the upstream API.
//!
//! Every attempt waits for the shared limiter, is bounded by the configured
//! timeout, and a 429 answer is retried exactly once after the delay named by
//! `Retry-After` (or one pacing interval when the header is missing).

use super::rate_limiter::{shared_limiter, FixedIntervalLimiter};
use super::transport::{url_path, HttpTransport, UpstreamRequest, UpstreamResponse};
use crate::config::IntelConfig;
use crate::domain::records::records_from_payload;
use crate::domain::{AuthMode, IntelError, JsonRecord};
use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Total attempts per request, including the single 429 retry.
const MAX_ATTEMPTS: u32 = 2;

/// Query parameter name carrying the token in `query` auth mode.
pub const AUTH_QUERY_PARAM: &str = "auth_token";

/// Parse a `Retry-After` value: delta-seconds (fractions allowed) or an HTTP date.
///
/// Dates in the past yield a zero delay. Returns `None` for anything else.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some(Duration::from_millis((seconds * 1000.0).round() as u64));
        }
        return None;
    }
    DateTime::parse_from_rfc2822(trimmed).ok().map(|at| {
        let millis = (at.with_timezone(&Utc) - now).num_milliseconds().max(0);
        Duration::from_millis(millis as u64)
    })
}

/// Normalize a response body into records; empty or non-JSON bodies are empty.
pub fn parse_body(body: &str, path: &str) -> Vec<JsonRecord> {
    if body.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(payload) => records_from_payload(payload),
        Err(e) => {
            warn!("Ignoring non-JSON response body from {}: {}", path, e);
            Vec::new()
        }
    }
}

/// Executes authenticated GET requests through a shared pacing gate.
#[derive(Clone)]
pub struct RequestExecutor {
    base_url: String,
    auth_token: String,
    auth_mode: AuthMode,
    timeout: Duration,
    retry_fallback: Duration,
    limiter: Arc<FixedIntervalLimiter>,
    transport: Arc<dyn HttpTransport>,
}

impl RequestExecutor {
    /// Build an executor that shares the process-wide limiter for this base URL and budget.
    pub fn new(config: &IntelConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let limiter = shared_limiter(&config.base_url, config.requests_per_minute);
        Self {
            base_url: config.base_url.clone(),
            auth_token: config.auth_token.clone(),
            auth_mode: config.auth_mode,
            timeout: config.timeout,
            retry_fallback: config.request_interval(),
            limiter,
            transport,
        }
    }

    /// Replace the pacing gate (tests use a private limiter).
    pub fn with_limiter(mut self, limiter: Arc<FixedIntervalLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn limiter(&self) -> &Arc<FixedIntervalLimiter> {
        &self.limiter
    }

    /// Join `path` onto the base URL and append non-empty params plus the query token.
    pub fn build_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, IntelError> {
        let base = format!("{}/", self.base_url.trim_end_matches('/'));
        let mut url = Url::parse(&base)
            .and_then(|base| base.join(path.trim_start_matches('/')))
            .map_err(|e| {
                IntelError::Configuration(format!(
                    "invalid upstream URL '{}' + '{}': {}",
                    self.base_url, path, e
                ))
            })?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                if !value.trim().is_empty() {
                    query.append_pair(name, value);
                }
            }
            if self.auth_mode.uses_query() {
                query.append_pair(AUTH_QUERY_PARAM, &self.auth_token);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn build_request(&self, url: &Url) -> UpstreamRequest {
        let request = UpstreamRequest::get(url.as_str()).with_header("accept", "application/json");
        if self.auth_mode.uses_bearer() {
            request.with_header("authorization", format!("Bearer {}", self.auth_token))
        } else {
            request
        }
    }

    async fn attempt(&self, request: UpstreamRequest) -> Result<UpstreamResponse, IntelError> {
        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => {
                counter!("appintel_upstream_timeouts_total").increment(1);
                Err(IntelError::Timeout {
                    after: self.timeout,
                })
            }
        }
    }

    /// Perform one logical GET and normalize the body into records.
    ///
    /// # Arguments
    ///
    /// * `path` - Endpoint path with any `{os}` placeholder already substituted
    /// * `params` - Query parameters; empty values are skipped
    ///
    /// # Errors
    ///
    /// * `IntelError::Timeout` when an attempt exceeds the configured duration
    /// * `IntelError::UpstreamFailure` for a non-2xx status after the retry budget
    /// * `IntelError::Transport` for connection-level failures
    pub async fn get_records(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<JsonRecord>, IntelError> {
        let url = self.build_url(path, params)?;
        let request = self.build_request(&url);
        let url_path = url_path(url.as_str());

        let mut attempt = 1;
        loop {
            self.limiter.wait_turn().await;
            debug!("Fetching upstream: {} (attempt {})", url_path, attempt);

            let response = self.attempt(request.clone()).await?;
            counter!("appintel_upstream_requests_total", "status" => response.status.to_string())
                .increment(1);

            if response.status == 429 && attempt < MAX_ATTEMPTS {
                let delay = response
                    .retry_after
                    .as_deref()
                    .and_then(|value| parse_retry_after(value, Utc::now()))
                    .unwrap_or(self.retry_fallback);
                warn!(
                    "Upstream rate limited {}, retrying in {}ms",
                    url_path,
                    delay.as_millis()
                );
                counter!("appintel_upstream_retries_total").increment(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if !response.is_success() {
                let body = response.body.trim();
                let detail = if body.is_empty() {
                    response.status_text.clone()
                } else {
                    body.to_string()
                };
                return Err(IntelError::UpstreamFailure {
                    status: response.status,
                    path: url_path,
                    detail,
                });
            }

            return Ok(parse_body(&response.body, &url_path));
        }
    }
}
