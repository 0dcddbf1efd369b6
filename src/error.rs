//! Passerelle error types

use std::time::Duration;

use serde::Serialize;

/// Passerelle error types
#[derive(Debug, thiserror::Error)]
pub enum PasserelleError {
    // Client request errors
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("malformed request body: {0}")]
    MalformedRequest(String),

    #[error("request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // Upstream errors
    #[error("authentication failed ({status}) at {endpoint}: {message}")]
    AuthFailure {
        status: u16,
        endpoint: String,
        message: String,
    },

    #[error("quota exceeded at {endpoint}, retry after {retry_after:?}")]
    QuotaExceeded {
        endpoint: String,
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("upstream error ({status}) at {endpoint}: {message}")]
    Upstream {
        status: u16,
        endpoint: String,
        message: String,
    },

    #[error("timed out waiting for {endpoint}")]
    Timeout { endpoint: String },

    #[error("connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error("malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PasserelleError {
    /// Whether the error is worth retrying against the same endpoint.
    ///
    /// 5xx responses, timeouts and connection failures are transient.
    /// Auth, quota and other 4xx responses are not: the dispatcher moves on
    /// to the next candidate endpoint instead.
    pub fn is_transient(&self) -> bool {
        match self {
            PasserelleError::Upstream { status, .. } => *status >= 500,
            PasserelleError::Timeout { .. } | PasserelleError::Connection { .. } => true,
            _ => false,
        }
    }

    /// HTTP status reported to the calling client.
    pub fn status_code(&self) -> u16 {
        match self {
            PasserelleError::MissingField(_) | PasserelleError::InvalidField { .. } => 422,
            PasserelleError::MalformedRequest(_) => 400,
            PasserelleError::PayloadTooLarge(_) => 413,
            PasserelleError::ModelNotFound(_) => 404,
            PasserelleError::AuthFailure { status, .. } => *status,
            PasserelleError::QuotaExceeded { .. } => 429,
            PasserelleError::Upstream { status, .. } => *status,
            _ => 500,
        }
    }

    /// Short machine-readable classification.
    pub fn kind(&self) -> &'static str {
        match self {
            PasserelleError::MissingField(_) => "missing_field",
            PasserelleError::InvalidField { .. } => "invalid_field",
            PasserelleError::MalformedRequest(_) => "malformed_request",
            PasserelleError::PayloadTooLarge(_) => "payload_too_large",
            PasserelleError::ModelNotFound(_) => "model_not_found",
            PasserelleError::AuthFailure { .. } => "auth_failure",
            PasserelleError::QuotaExceeded { .. } => "quota_exceeded",
            PasserelleError::Upstream { status, .. } if *status >= 500 => {
                "transient_upstream_error"
            }
            PasserelleError::Upstream { .. } => "upstream_rejected",
            PasserelleError::Timeout { .. } | PasserelleError::Connection { .. } => {
                "transient_upstream_error"
            }
            PasserelleError::MalformedUpstreamResponse(_) => "malformed_upstream_response",
            PasserelleError::Configuration(_) => "configuration_error",
        }
    }

    /// Endpoint URL the error was observed at, if it came from upstream.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            PasserelleError::AuthFailure { endpoint, .. }
            | PasserelleError::QuotaExceeded { endpoint, .. }
            | PasserelleError::Upstream { endpoint, .. }
            | PasserelleError::Timeout { endpoint }
            | PasserelleError::Connection { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// Provider `retry-after` hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PasserelleError::QuotaExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Render the error as the JSON body sent to clients.
    pub fn to_body(&self, model: Option<&str>) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            detail: self.to_string(),
            model: model.map(str::to_owned),
            endpoint: self.endpoint().map(str::to_owned),
        }
    }
}

/// Structured error body returned to clients in place of a bare failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

/// Result type alias for Passerelle operations
pub type Result<T> = std::result::Result<T, PasserelleError>;
