//! Authenticated HTTP calls to upstream endpoints, with failure classification.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::{PasserelleError, Result};

/// Path prefix of the provider's OpenAI-compatible API.
const OPENAI_COMPAT_PREFIX: &str = "api/openai_compat/v1";

/// Longest upstream error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 1000;

/// `{base_url}/api/openai_compat/v1/{path}`
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{OPENAI_COMPAT_PREFIX}/{path}",
        base_url.trim_end_matches('/')
    )
}

/// Thin client over `reqwest` that adds the bearer token and turns
/// responses into classified [`PasserelleError`]s.
#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    token: String,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    /// Create a client authenticating with `token`.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PasserelleError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self::with_http(http, token))
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_http(http: Client, token: impl Into<String>) -> Self {
        Self {
            http,
            token: token.into(),
        }
    }

    /// `GET url` with a timeout. Returns the (2xx) status on success.
    pub async fn get(&self, url: &str, timeout: Duration) -> Result<u16> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_send_error(e, url))?;
        let response = check_status(response, url).await?;
        Ok(response.status().as_u16())
    }

    /// `POST url` with a JSON body and a timeout; returns the JSON response.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_send_error(e, url))?;
        let response = check_status(response, url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_send_error(e, url))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            PasserelleError::MalformedUpstreamResponse(format!("{url} returned invalid JSON: {e}"))
        })
    }
}

fn classify_send_error(e: reqwest::Error, endpoint: &str) -> PasserelleError {
    if e.is_timeout() {
        PasserelleError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else {
        PasserelleError::Connection {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        }
    }
}

/// Pass 2xx responses through; map everything else to an error class.
async fn check_status(response: Response, endpoint: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let message = truncate(response.text().await.unwrap_or_default());
    let endpoint = endpoint.to_string();

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PasserelleError::AuthFailure {
            status: status.as_u16(),
            endpoint,
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => PasserelleError::QuotaExceeded {
            endpoint,
            retry_after,
            message,
        },
        _ => PasserelleError::Upstream {
            status: status.as_u16(),
            endpoint,
            message,
        },
    })
}

fn truncate(mut text: String) -> String {
    if let Some((idx, _)) = text.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        text.truncate(idx);
        text.push('…');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_openai_compat_urls() {
        assert_eq!(
            endpoint_url("https://m.example.net/", "chat/completions"),
            "https://m.example.net/api/openai_compat/v1/chat/completions"
        );
        assert_eq!(
            endpoint_url("https://m.example.net", "models"),
            "https://m.example.net/api/openai_compat/v1/models"
        );
    }

    #[test]
    fn truncates_long_bodies_on_char_boundary() {
        let long = "é".repeat(MAX_ERROR_BODY_CHARS + 10);
        let t = truncate(long);
        assert_eq!(t.chars().count(), MAX_ERROR_BODY_CHARS + 1);
        assert_eq!(truncate("short".into()), "short");
    }
}
