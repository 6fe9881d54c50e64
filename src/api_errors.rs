//! # Upstream Error Types Module
//!
//! This module defines the error kinds produced when talking to the catalog
//! API. Callers of the public catalog operations never see these: they are
//! logged at the boundary and converted into empty or degraded results. They
//! stay explicit so tests and logs can tell the failure modes apart.

use thiserror::Error;

/// Error kinds for upstream catalog operations
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Connection failures, timeouts, unreadable bodies
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Non-2xx response
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Malformed JSON or an unexpected document shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// The requested resource does not exist upstream
    #[error("Not found: {0}")]
    NotFound(String),

    /// The circuit breaker is refusing requests
    #[error("Circuit open: upstream marked unavailable")]
    CircuitOpen,
}

impl ApiError {
    pub fn transport(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(message: impl std::fmt::Display) -> Self {
        Self::Parse(message.to_string())
    }

    /// Whether a retry has any chance of a different outcome
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 429,
            ApiError::Parse(_) | ApiError::NotFound(_) | ApiError::CircuitOpen => false,
        }
    }

    /// Whether this failure should count against the circuit breaker
    pub fn counts_as_outage(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting() {
        let err = ApiError::Status {
            status: 503,
            url: "https://example.org/x".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503 for https://example.org/x");

        let err = ApiError::transport("https://example.org/y", "timed out");
        assert_eq!(
            err.to_string(),
            "Transport error for https://example.org/y: timed out"
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(ApiError::transport("u", "reset").is_retryable());
        assert!(ApiError::Status { status: 502, url: "u".into() }.is_retryable());
        assert!(ApiError::Status { status: 429, url: "u".into() }.is_retryable());
        assert!(!ApiError::Status { status: 404, url: "u".into() }.is_retryable());
        assert!(!ApiError::parse("bad json").is_retryable());
        assert!(!ApiError::CircuitOpen.is_retryable());
    }

    #[test]
    fn test_outage_classification() {
        assert!(ApiError::transport("u", "refused").counts_as_outage());
        assert!(!ApiError::Status { status: 429, url: "u".into() }.counts_as_outage());
        assert!(!ApiError::NotFound("ds".into()).counts_as_outage());
    }
}
