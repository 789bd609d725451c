//! HTTP plumbing shared by the remote backends.

use crate::gateway::GatewayError;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Longest error body excerpt kept in a message.
const MAX_ERROR_BODY: usize = 300;

/// Maps an HTTP failure status onto the Gateway taxonomy.
pub(crate) fn classify_status(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> GatewayError {
    let message = format!("HTTP {status}: {}", error_message(body));
    match status {
        401 | 403 => GatewayError::Auth { message },
        429 => GatewayError::RateLimited {
            message,
            retry_after,
        },
        408 => GatewayError::Transient { message },
        400..=499 => GatewayError::InvalidRequest { message },
        _ => GatewayError::Transient { message },
    }
}

/// `Retry-After` in delta-seconds form.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Prefers the API's `error.message` field over the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
                .or_else(|| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        });
    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > MAX_ERROR_BODY {
        let cut: String = message.chars().take(MAX_ERROR_BODY).collect();
        format!("{cut}...")
    } else {
        message
    }
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    GatewayError::transient(format!("transport error: {error}"))
}

/// POSTs a JSON body and returns the parsed JSON response.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    body: &serde_json::Value,
) -> Result<serde_json::Value, GatewayError> {
    let payload = serde_json::to_vec(body)
        .map_err(|e| GatewayError::invalid_request(format!("unserializable body: {e}")))?;
    let response = client
        .post(url)
        .headers(headers)
        .header(CONTENT_TYPE, "application/json")
        .body(payload)
        .send()
        .await
        .map_err(transport_error)?;

    let status = response.status();
    let wait = retry_after(response.headers());
    let text = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(classify_status(status.as_u16(), &text, wait));
    }
    serde_json::from_str(&text)
        .map_err(|e| GatewayError::transient(format!("malformed response body: {e}")))
}
