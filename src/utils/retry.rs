use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::warn;

use crate::config::Config;
use crate::error::{StylistError, StylistResult};
use crate::utils::http::truncate_for_log;

const ERROR_BODY_LIMIT: usize = 2000;
const MAX_BACKOFF_SHIFT: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.api_max_retries,
            base_delay: Duration::from_millis(config.api_retry_base_delay_ms),
        }
    }

    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_SHIFT);
        self.base_delay.saturating_mul(factor)
    }
}

pub fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Pulls `error.message` (or a top-level `message`/`error` string) out of an
/// upstream error body, falling back to the truncated raw body.
pub fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("message").and_then(|v| v.as_str()))
            .or_else(|| value.get("error").and_then(|v| v.as_str()));
        if let Some(message) = message {
            return message.to_string();
        }
        return truncate_for_log(&value.to_string(), ERROR_BODY_LIMIT);
    }

    truncate_for_log(trimmed, ERROR_BODY_LIMIT)
}

/// Sends the request built by `build`, retrying transient failures with
/// exponential backoff. Non-2xx responses that are not retried become
/// `StylistError::Upstream`.
pub async fn send_with_retry<F>(
    service: &'static str,
    policy: &RetryPolicy,
    build: F,
) -> StylistResult<Response>
where
    F: Fn() -> RequestBuilder,
{
    let attempts = policy.max_retries + 1;
    let mut attempt = 0;
    loop {
        let last_attempt = attempt + 1 >= attempts;
        let response = match build().send().await {
            Ok(response) => response,
            Err(err) => {
                let retry = should_retry_error(&err) && !last_attempt;
                warn!(
                    "{} request error: {} (timeout={}, connect={}, attempt={}/{}, retrying={})",
                    service,
                    err,
                    err.is_timeout(),
                    err.is_connect(),
                    attempt + 1,
                    attempts,
                    retry
                );
                if retry {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Err(StylistError::upstream(service, err.to_string()));
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = summarize_error_body(&body);
        let retry = should_retry_status(status) && !last_attempt;
        warn!(
            "{} API error: status={}, detail={}, attempt={}/{}, retrying={}",
            service,
            status,
            detail,
            attempt + 1,
            attempts,
            retry
        );
        if retry {
            tokio::time::sleep(policy.delay_for(attempt)).await;
            attempt += 1;
            continue;
        }
        return Err(StylistError::upstream(
            service,
            format!("status {}: {}", status.as_u16(), detail),
        ));
    }
}
