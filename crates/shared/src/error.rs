//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};

/// RFC7807 Problem Details (application/problem+json)
///
/// The backend answers failed `/api/*` calls with this envelope when it can;
/// clients surface `detail` (or `title`) instead of a bare status code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type", default)]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    #[serde(default)]
    pub title: String,
    /// HTTP status code.
    #[serde(default)]
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A URI reference that identifies the specific occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.title.trim().is_empty() {
        return Some(parsed.title);
    }
    None
}

/// REST error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        /// Problem detail when the body carried one, raw body otherwise.
        message: String,
    },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Build an HTTP error from a non-success response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = try_problem_detail(body).unwrap_or_else(|| body.to_string());
        ApiError::Http { status, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised while decoding frames or deriving endpoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("payload of `{kind}` does not match the requested shape: {reason}")]
    Payload { kind: &'static str, reason: String },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unsupported url scheme `{0}`, expected http, https, ws or wss")]
    UnsupportedScheme(String),
}
