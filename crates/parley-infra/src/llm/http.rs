//! Shared HTTP plumbing for the backend adapters.
//!
//! Every adapter classifies failures the same way so the conversation layer
//! can tell transient failures (worth a different config) from fatal ones.

use std::time::Duration;

use parley_types::llm::LlmError;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// Per-request timeout applied by every adapter client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the reqwest client an adapter sends through.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Provider {
            message: format!("failed to create HTTP client: {e}"),
        })
}

/// Map a transport-level reqwest failure.
///
/// Unreachable backends count as overloaded so the pool can fail over.
pub fn classify_transport(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else if err.is_connect() {
        LlmError::Overloaded(format!("connection failed: {err}"))
    } else {
        LlmError::Provider {
            message: format!("HTTP request failed: {err}"),
        }
    }
}

/// Map a non-success HTTP status and its body.
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: String) -> LlmError {
    match status.as_u16() {
        408 | 504 => LlmError::Timeout,
        429 => LlmError::RateLimited {
            retry_after_ms: retry_after_ms(headers),
        },
        500 | 502 | 503 | 529 => LlmError::Overloaded(body),
        401 | 403 => LlmError::AuthenticationFailed,
        400 | 404 | 422 => LlmError::InvalidRequest(body),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

/// `Retry-After` in milliseconds, when given as whole seconds.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs * 1000)
}
