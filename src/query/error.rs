use std::time::Duration;

use thiserror::Error;

/// Failure of a query or mutation, as stored on cache entries.
///
/// The same error value is handed to every observer of a deduplicated
/// request, so it is cheap to clone and carries owned messages only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The request was malformed or unauthorized (4xx). Never retried.
    #[error("client error ({status}): {message}")]
    Client { status: u16, message: String },
    /// Network failure or 5xx response. Retried with backoff.
    #[error("transient failure{}: {message}", status_suffix(*.status))]
    Transient {
        status: Option<u16>,
        message: String,
    },
    /// The request exceeded its time budget. Treated like a transient failure.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// A key segment has no canonical representation.
    #[error("invalid key segment: {0}")]
    InvalidKeySegment(String),
    /// The payload did not match the namespace's declared response type.
    #[error("payload rejected: {0}")]
    Decode(String),
    /// The client was shut down before the request could run.
    #[error("query client is shut down")]
    Cancelled,
}

fn status_suffix(status: Option<u16>) -> String {
    status.map(|code| format!(" ({code})")).unwrap_or_default()
}

impl QueryError {
    /// Classifies an HTTP-like status code.
    ///
    /// `4xx` maps to [`Client`](Self::Client); everything else (including
    /// `408` and `429`, which are worth retrying) maps to
    /// [`Transient`](Self::Transient).
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 429 => Self::Transient {
                status: Some(status),
                message,
            },
            400..=499 => Self::Client { status, message },
            _ => Self::Transient {
                status: Some(status),
                message,
            },
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Whether a retry policy may attempt the request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout(_))
    }

    /// Status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } => Some(*status),
            Self::Transient { status, .. } => *status,
            _ => None,
        }
    }

    /// Short label used as a metric and log tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Client { .. } => "client",
            Self::Transient { .. } => "transient",
            Self::Timeout(_) => "timeout",
            Self::InvalidKeySegment(_) => "invalid_key",
            Self::Decode(_) => "decode",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
