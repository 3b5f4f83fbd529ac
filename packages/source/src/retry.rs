//! HTTP retry helpers for the case log API.
//!
//! Fetchers call [`send_json`] instead of `reqwest::RequestBuilder::send()`
//! so transient failures (timeouts, connection resets, HTTP 429, HTTP 5xx)
//! are retried with exponential backoff. Other 4xx responses, including
//! authentication failures, are returned immediately as
//! [`SourceError::Status`].
//!
//! ```ignore
//! let body = retry::send_json(|| client.get(&url).query(&params)).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Maximum number of retries for transient HTTP errors.
///
/// Backoff doubles from 2s, so giving up takes 2 + 4 + 8 + 16 = 30s of
/// waiting on top of the request timeouts.
const MAX_RETRIES: u32 = 4;

/// Maximum number of re-fetches when the body cannot be decoded as JSON
/// (truncated or garbled responses).
const MAX_BODY_RETRIES: u32 = 2;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt because request
/// builders are consumed by `.send()`.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body is not valid JSON
/// after all body retries.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;

    loop {
        let response = send_inner(&build_request, MAX_RETRIES).await?;
        let url = response.url().to_string();
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str(&text) {
            Ok(value) => return Ok(value),
            Err(e) if body_attempt < MAX_BODY_RETRIES => {
                body_attempt += 1;
                let delay = Duration::from_secs(1u64 << body_attempt);
                log::warn!(
                    "JSON parse failed (body retry {body_attempt}/{MAX_BODY_RETRIES}), \
                     re-fetching in {delay:?}...\n  \
                     url: {url}\n  \
                     status: {status}\n  \
                     parse error: {e}\n  \
                     body preview: {}",
                    preview(&text),
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::error!(
                    "JSON parse failed after {MAX_BODY_RETRIES} retries, giving up.\n  \
                     url: {url}\n  \
                     received: {} bytes\n  \
                     body preview: {}",
                    text.len(),
                    preview(&text),
                );
                return Err(SourceError::Json(e));
            }
        }
    }
}

/// Core retry loop: returns the first 2xx/3xx response.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    max_retries: u32,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                if is_retryable_status(status) && attempt < max_retries {
                    log::warn!("  HTTP {status}, will retry");
                    attempt += 1;
                    continue;
                }
                if status.is_client_error() || status.is_server_error() {
                    return Err(SourceError::Status {
                        status,
                        url: response.url().to_string(),
                    });
                }
                return Ok(response);
            }
        }
    }
}

/// HTTP statuses worth retrying: 429 and any 5xx.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

fn preview(text: &str) -> &str {
    if text.len() <= BODY_PREVIEW_LEN {
        return text;
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
