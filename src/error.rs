use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy surfaced to callers inside `ModeResult::error`.
///
/// `RoutingFailure` and `ScoringTimeout` are recovered inside the router and
/// never reach a caller; they exist so diagnostics and logs can name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RoutingFailure,
    ActivationFailure,
    ConcurrencyLimitExceeded,
    ProcessingTimeout,
    ProcessingError,
    ScoringTimeout,
    Unavailable,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoutingFailure => "routing_failure",
            Self::ActivationFailure => "activation_failure",
            Self::ConcurrencyLimitExceeded => "concurrency_limit_exceeded",
            Self::ProcessingTimeout => "processing_timeout",
            Self::ProcessingError => "processing_error",
            Self::ScoringTimeout => "scoring_timeout",
            Self::Unavailable => "unavailable",
        }
    }

    /// Whether the same input may succeed if submitted again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyLimitExceeded | Self::ProcessingTimeout
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error descriptor carried by a failed `ModeResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ModeFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn concurrency_limit(mode_id: &str, active: usize, max: usize) -> Self {
        Self::new(
            FailureKind::ConcurrencyLimitExceeded,
            format!(
                "mode '{}' is at capacity ({}/{} sessions)",
                mode_id, active, max
            ),
        )
    }

    pub fn timeout(mode_id: &str, after_ms: u64) -> Self {
        Self::new(
            FailureKind::ProcessingTimeout,
            format!("mode '{}' timed out after {}ms", mode_id, after_ms),
        )
    }
}

impl fmt::Display for ModeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ModeFailure {}

#[derive(Error, Debug)]
pub enum ModeError {
    #[error("Mode not found: {0}")]
    ModeNotFound(String),

    #[error("Mode already registered: {0}")]
    ModeAlreadyRegistered(String),

    #[error("Fallback mode already registered: {existing} (attempted: {attempted})")]
    FallbackConflict { existing: String, attempted: String },

    #[error("No fallback mode registered")]
    MissingFallback,

    #[error("Fallback mode cannot be removed or disabled: {0}")]
    FallbackRequired(String),

    #[error("Session not found: {session_id}/{mode_id}")]
    SessionNotFound { session_id: String, mode_id: String },

    #[error("Invalid session transition: {from} → {to} (allowed: {allowed})")]
    InvalidSessionTransition {
        from: String,
        to: String,
        allowed: String,
    },

    #[error("Plugin '{mode_id}' failed: {message}")]
    Plugin { mode_id: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ModeError {
    pub fn plugin(mode_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            mode_id: mode_id.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::ConcurrencyLimitExceeded.is_retryable());
        assert!(FailureKind::ProcessingTimeout.is_retryable());
        assert!(!FailureKind::ProcessingError.is_retryable());
    }

    #[test]
    fn test_failure_serializes_snake_case() {
        let failure = ModeFailure::concurrency_limit("planning", 2, 2);
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "concurrency_limit_exceeded");
        assert!(failure.message.contains("2/2"));
    }

    #[test]
    fn test_error_display() {
        let err = ModeError::FallbackConflict {
            existing: "general".into(),
            attempted: "other".into(),
        };
        assert!(err.to_string().contains("general"));
        assert_eq!(
            ModeError::ModeNotFound("x".into()).to_string(),
            "Mode not found: x"
        );
    }
}
