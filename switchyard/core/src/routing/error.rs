//! Routing Errors
//!
//! Error taxonomy for the routing core:
//!
//! - [`BackendError`]: a single failed backend invocation, classified by
//!   [`ErrorKind`] as transient (retryable) or permanent
//! - [`ConfigurationError`]: the strategy table itself is unusable; surfaced
//!   immediately without consuming a strategy slot
//! - [`RoutingError::AllStrategiesExhausted`]: terminal failure after every
//!   eligible strategy failed or was skipped

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Kind
// ============================================================================

/// Classification of a backend failure
///
/// Transient kinds may be retried in place when a retry rule matches them.
/// Permanent kinds always escalate straight to a strategy-level failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Backend temporarily unreachable or overloaded
    Unavailable,
    /// Call exceeded its deadline
    DeadlineExceeded,
    /// Backend-side internal failure
    Internal,
    /// Quota or rate limit hit
    ResourceExhausted,
    /// Call aborted by the backend (e.g. conflict)
    Aborted,
    /// Call cancelled by the caller
    Cancelled,
    /// Unclassified failure
    Unknown,
    /// Request rejected as malformed
    InvalidArgument,
    /// Target model or resource does not exist
    NotFound,
    /// Caller lacks permission
    PermissionDenied,
    /// Credentials missing or invalid
    Unauthenticated,
    /// Backend not in a state to serve the request
    FailedPrecondition,
    /// Operation not supported by the backend
    Unimplemented,
}

impl ErrorKind {
    /// All kinds, transient first
    pub const ALL: [ErrorKind; 13] = [
        Self::Unavailable,
        Self::DeadlineExceeded,
        Self::Internal,
        Self::ResourceExhausted,
        Self::Aborted,
        Self::Cancelled,
        Self::Unknown,
        Self::InvalidArgument,
        Self::NotFound,
        Self::PermissionDenied,
        Self::Unauthenticated,
        Self::FailedPrecondition,
        Self::Unimplemented,
    ];

    /// Whether this kind may be retried in place
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Unavailable
                | Self::DeadlineExceeded
                | Self::Internal
                | Self::ResourceExhausted
                | Self::Aborted
                | Self::Cancelled
                | Self::Unknown
        )
    }

    /// Whether this kind is never retried
    #[must_use]
    pub fn is_permanent(self) -> bool {
        !self.is_transient()
    }

    /// Map an HTTP status code onto an error kind
    ///
    /// Intended for backend implementations that speak HTTP; the routing core
    /// itself never sees status codes.
    #[must_use]
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            408 | 504 => Self::DeadlineExceeded,
            409 => Self::Aborted,
            412 => Self::FailedPrecondition,
            429 => Self::ResourceExhausted,
            500 => Self::Internal,
            501 => Self::Unimplemented,
            502 | 503 => Self::Unavailable,
            400..=499 => Self::InvalidArgument,
            _ => Self::Unknown,
        }
    }

    /// Stable snake_case name (matches the config file spelling)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal => "internal",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::Unauthenticated => "unauthenticated",
            Self::FailedPrecondition => "failed_precondition",
            Self::Unimplemented => "unimplemented",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unrecognised error kind name
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown error kind: {0}")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownErrorKind(s.to_string()))
    }
}

// ============================================================================
// Backend Error
// ============================================================================

/// A failed backend invocation
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct BackendError {
    /// Failure classification, matched against retry rules
    pub kind: ErrorKind,
    /// Human-readable detail from the backend
    pub message: String,
}

impl BackendError {
    /// Create a new backend error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The in-flight call was cancelled by the caller
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "call cancelled")
    }

    /// The in-flight call exceeded its per-call timeout
    #[must_use]
    pub fn timed_out(limit: Duration) -> Self {
        Self::new(
            ErrorKind::DeadlineExceeded,
            format!("call exceeded {}ms timeout", limit.as_millis()),
        )
    }

    /// Whether the error may be retried in place
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

// ============================================================================
// Configuration Error
// ============================================================================

/// The strategy table cannot be used as configured
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The table has no strategies
    #[error("no strategies configured")]
    NoStrategies,

    /// A strategy id is empty
    #[error("strategy id must not be empty")]
    EmptyStrategyId,

    /// Two strategies share an id
    #[error("duplicate strategy id: {0}")]
    DuplicateStrategy(String),

    /// A referenced strategy id is not in the table
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// A retry rule allows zero attempts
    #[error("strategy {strategy}: retry rule {index} must allow at least one attempt")]
    InvalidRetryRule {
        /// Strategy owning the rule
        strategy: String,
        /// Position of the rule in the policy
        index: usize,
    },

    /// `min_errors_to_disable` is zero
    #[error("strategy {0}: min_errors_to_disable must be at least 1")]
    InvalidDisableThreshold(String),
}

// ============================================================================
// Failure Bookkeeping
// ============================================================================

/// A strategy that was declared failed during one routing attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    /// Strategy that failed
    pub strategy_id: String,
    /// Last error it returned
    pub error: BackendError,
    /// Backend calls made against it before giving up
    pub attempts: u32,
}

/// Why the router passed over a strategy without calling it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Circuit breaker tripped (permanent until reset)
    Disabled,
    /// Within the error cooldown window
    CoolingDown,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::CoolingDown => write!(f, "cooling down"),
        }
    }
}

/// A strategy skipped by the router
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedStrategy {
    /// Strategy that was skipped
    pub strategy_id: String,
    /// Why it was skipped
    pub reason: SkipReason,
}

// ============================================================================
// Routing Error
// ============================================================================

/// Terminal routing errors
#[derive(Clone, Debug, Error)]
pub enum RoutingError {
    /// The strategy table is unusable; no backend was called
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Every eligible strategy failed or was skipped
    #[error(
        "all strategies exhausted for {logical_name}: {}",
        describe_exhaustion(.failures, .skipped)
    )]
    AllStrategiesExhausted {
        /// Logical request type the table serves
        logical_name: String,
        /// Failed strategies in attempt order, each with its last error
        failures: Vec<StrategyFailure>,
        /// Strategies passed over without a call
        skipped: Vec<SkippedStrategy>,
    },
}

impl RoutingError {
    /// Ids of failed strategies in attempt order (empty for configuration errors)
    #[must_use]
    pub fn failed_strategy_ids(&self) -> Vec<&str> {
        match self {
            Self::Configuration(_) => Vec::new(),
            Self::AllStrategiesExhausted { failures, .. } => {
                failures.iter().map(|f| f.strategy_id.as_str()).collect()
            }
        }
    }

    /// Whether this is a configuration problem rather than a runtime failure
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

fn describe_exhaustion(failures: &[StrategyFailure], skipped: &[SkippedStrategy]) -> String {
    let mut parts: Vec<String> = failures
        .iter()
        .map(|f| format!("{} failed ({})", f.strategy_id, f.error))
        .collect();
    parts.extend(
        skipped
            .iter()
            .map(|s| format!("{} skipped ({})", s.strategy_id, s.reason)),
    );
    if parts.is_empty() {
        "no available strategies".to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert!(ErrorKind::Unavailable.is_transient());
        assert!(ErrorKind::DeadlineExceeded.is_transient());
        assert!(ErrorKind::Cancelled.is_transient());
        assert!(ErrorKind::InvalidArgument.is_permanent());
        assert!(ErrorKind::NotFound.is_permanent());
        assert!(ErrorKind::PermissionDenied.is_permanent());
    }

    #[test]
    fn test_error_kind_from_http_status() {
        assert_eq!(ErrorKind::from_http_status(429), ErrorKind::ResourceExhausted);
        assert_eq!(ErrorKind::from_http_status(503), ErrorKind::Unavailable);
        assert_eq!(ErrorKind::from_http_status(504), ErrorKind::DeadlineExceeded);
        assert_eq!(ErrorKind::from_http_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_http_status(418), ErrorKind::InvalidArgument);
        assert_eq!(ErrorKind::from_http_status(599), ErrorKind::Unknown);
    }

    #[test]
    fn test_error_kind_parse() {
        assert_eq!("unavailable".parse::<ErrorKind>(), Ok(ErrorKind::Unavailable));
        assert_eq!(
            "Deadline-Exceeded".parse::<ErrorKind>(),
            Ok(ErrorKind::DeadlineExceeded)
        );
        assert!("teapot".parse::<ErrorKind>().is_err());

        for kind in ErrorKind::ALL {
            assert_eq!(kind.as_str().parse::<ErrorKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_exhaustion_message_lists_strategies() {
        let err = RoutingError::AllStrategiesExhausted {
            logical_name: "chat".to_string(),
            failures: vec![StrategyFailure {
                strategy_id: "primary".to_string(),
                error: BackendError::new(ErrorKind::Unavailable, "down"),
                attempts: 2,
            }],
            skipped: vec![SkippedStrategy {
                strategy_id: "backup".to_string(),
                reason: SkipReason::Disabled,
            }],
        };

        let message = err.to_string();
        assert!(message.contains("primary failed (unavailable: down)"));
        assert!(message.contains("backup skipped (disabled)"));
        assert_eq!(err.failed_strategy_ids(), vec!["primary"]);
        assert!(!err.is_configuration());
    }
}
