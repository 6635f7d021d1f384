use std::time::Duration;

use thiserror::Error;

use crate::timeouts::Operation;

/// Failure taxonomy shared by the inference client and the gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The caller's request is malformed. Never retried.
    #[error("{title}: {message}")]
    ValidationFailure {
        title: String,
        field: &'static str,
        message: String,
        kind: ValidationKind,
    },

    /// The upstream service could not be contacted at all.
    #[error("AI service unavailable during {operation}: {reason}")]
    UpstreamUnavailable { operation: Operation, reason: String },

    /// The operation exceeded the budget of its timeout class.
    #[error("AI service did not answer {operation} within {}s", .budget.as_secs())]
    UpstreamTimeout {
        operation: Operation,
        budget: Duration,
    },

    /// The upstream was reached but answered with a failure.
    #[error("AI service failed {operation}: {detail}")]
    UpstreamError {
        operation: Operation,
        status: Option<u16>,
        detail: String,
    },
}

/// Distinguishes validation failures that map to different response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Invalid,
    TooLarge,
}

impl ClientError {
    pub fn missing_field(field: &'static str) -> Self {
        ClientError::ValidationFailure {
            title: "Missing required field".to_string(),
            field,
            message: format!("{} is required", field),
            kind: ValidationKind::Invalid,
        }
    }

    pub fn invalid(
        title: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        ClientError::ValidationFailure {
            title: title.into(),
            field,
            message: message.into(),
            kind: ValidationKind::Invalid,
        }
    }

    pub fn too_large(field: &'static str, message: impl Into<String>) -> Self {
        ClientError::ValidationFailure {
            title: "File too large".to_string(),
            field,
            message: message.into(),
            kind: ValidationKind::TooLarge,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::ValidationFailure { .. })
    }

    /// Unavailable and timed-out calls may succeed later; the other kinds will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::UpstreamUnavailable { .. } | ClientError::UpstreamTimeout { .. }
        )
    }

    /// Classify a transport failure from reqwest.
    pub(crate) fn from_transport(
        operation: Operation,
        budget: Duration,
        err: reqwest::Error,
    ) -> Self {
        if err.is_connect() {
            ClientError::UpstreamUnavailable {
                operation,
                reason: err.to_string(),
            }
        } else if err.is_timeout() {
            ClientError::UpstreamTimeout { operation, budget }
        } else if err.is_decode() {
            ClientError::UpstreamError {
                operation,
                status: err.status().map(|s| s.as_u16()),
                detail: format!("invalid response body: {}", err),
            }
        } else if let Some(status) = err.status() {
            ClientError::UpstreamError {
                operation,
                status: Some(status.as_u16()),
                detail: err.to_string(),
            }
        } else {
            ClientError::UpstreamUnavailable {
                operation,
                reason: err.to_string(),
            }
        }
    }
}

/// Rejected configuration values, reported at start-up.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be set to a valid value, got {value:?}")]
    InvalidValue { name: String, value: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("timeout for {0} must be greater than zero")]
    ZeroTimeout(Operation),

    #[error("report timeout ({report}s) must exceed the chat timeout ({chat}s)")]
    ReportNotLonger { report: u64, chat: u64 },

    #[error(
        "caller budget for {operation} ({outer}s) is shorter than the gateway budget ({inner}s)"
    )]
    NotNested {
        operation: Operation,
        outer: u64,
        inner: u64,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;
