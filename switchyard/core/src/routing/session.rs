//! Routing Session
//!
//! Per-request state threaded between the [`Router`](super::Router) and the
//! [`Executor`](super::Executor). A session is plain data: an external
//! scheduler can inspect it between steps and decide whether to loop.
//!
//! Two counters are kept apart on purpose:
//!
//! - `attempt_count` counts strategy selections (cross-strategy hops)
//! - `in_place_attempts` / `total_backend_calls` count backend invocations

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use super::error::{BackendError, ErrorKind, SkippedStrategy, StrategyFailure};

// ============================================================================
// Phase
// ============================================================================

/// Where a session sits in the routing state machine
///
/// ```text
/// Selecting -> Executing -> Succeeded
///                 |  ^
///                 v  |
///        RetryingSameStrategy
///                 |
///                 v
///             Advancing -> Selecting ... -> Exhausted
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoutingPhase {
    /// Waiting for the router
    #[default]
    Selecting,
    /// A strategy is selected and about to be (or being) invoked
    Executing,
    /// Retrying the current strategy in place
    RetryingSameStrategy,
    /// Current strategy failed; the router should pick the next one
    Advancing,
    /// Terminal success
    Succeeded,
    /// Terminal failure; no eligible strategy remains
    Exhausted,
}

impl RoutingPhase {
    /// Whether the session is finished
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }
}

// ============================================================================
// Session Error
// ============================================================================

/// Last error recorded on a session
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The most recent backend failure
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The router ran off the end of the table
    #[error("no available strategies")]
    NoAvailableStrategies,
}

impl SessionError {
    /// Error kind, if the error came from a backend
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Backend(err) => Some(err.kind),
            Self::NoAvailableStrategies => None,
        }
    }
}

// ============================================================================
// Routing Session
// ============================================================================

/// Mutable state of one routing attempt
pub struct RoutingSession<Req, Res> {
    /// Correlates log lines and reports for this request
    pub request_id: Uuid,
    /// Request as submitted; never modified
    pub original_request: Arc<Req>,
    /// Position in the sorted table; `len()` once exhausted
    pub current_strategy_index: usize,
    /// Strategy selections made so far (starts at 1)
    pub attempt_count: u32,
    /// Ids of strategies declared failed, in attempt order
    pub failed_strategy_ids: Vec<String>,
    /// Failed strategies with their last error, in attempt order
    pub failures: Vec<StrategyFailure>,
    /// Strategies the router passed over
    pub skipped: Vec<SkippedStrategy>,
    /// Set once a strategy returns a result
    pub success: bool,
    /// Backend response on success
    pub result: Option<Res>,
    /// Strategy that produced `result`
    pub served_by: Option<String>,
    /// Most recent error
    pub error: Option<SessionError>,
    /// Backend calls made against the current strategy
    pub in_place_attempts: u32,
    /// Backend calls made across all strategies
    pub total_backend_calls: u32,
    /// State machine position
    pub phase: RoutingPhase,
    /// When the session was created
    pub started_at: Instant,
}

impl<Req, Res> RoutingSession<Req, Res> {
    /// Fresh session positioned at the first strategy
    #[must_use]
    pub fn new(request: Arc<Req>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            original_request: request,
            current_strategy_index: 0,
            attempt_count: 1,
            failed_strategy_ids: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            success: false,
            result: None,
            served_by: None,
            error: None,
            in_place_attempts: 0,
            total_backend_calls: 0,
            phase: RoutingPhase::Selecting,
            started_at: Instant::now(),
        }
    }

    /// Move past the current strategy after a strategy-level failure
    ///
    /// Failures, skips, the request and the last error carry forward.
    pub fn advance(&mut self) {
        self.current_strategy_index = self.current_strategy_index.saturating_add(1);
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.in_place_attempts = 0;
        self.success = false;
        self.phase = RoutingPhase::Selecting;
    }

    /// Whether the index has run off a table of `table_len` strategies
    #[must_use]
    pub fn is_exhausted(&self, table_len: usize) -> bool {
        self.current_strategy_index >= table_len
    }

    /// Loop-back condition for an external scheduler
    ///
    /// True while the session has failed and lower-priority strategies remain
    /// after the current one.
    #[must_use]
    pub fn should_loop(&self, last_index: usize) -> bool {
        !self.success && self.current_strategy_index < last_index
    }

    /// Number of strategies declared failed before the current one
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.failed_strategy_ids.len()
    }

    /// Whether a strategy already failed on this session
    #[must_use]
    pub fn has_failed(&self, strategy_id: &str) -> bool {
        self.failed_strategy_ids.iter().any(|id| id == strategy_id)
    }

    /// Ids of skipped strategies, in skip order
    #[must_use]
    pub fn skipped_strategy_ids(&self) -> Vec<String> {
        self.skipped.iter().map(|s| s.strategy_id.clone()).collect()
    }

    /// Most recent backend error, if any
    #[must_use]
    pub fn last_backend_error(&self) -> Option<&BackendError> {
        match &self.error {
            Some(SessionError::Backend(err)) => Some(err),
            _ => None,
        }
    }
}

impl<Req, Res> fmt::Debug for RoutingSession<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingSession")
            .field("request_id", &self.request_id)
            .field("current_strategy_index", &self.current_strategy_index)
            .field("attempt_count", &self.attempt_count)
            .field("failed_strategy_ids", &self.failed_strategy_ids)
            .field("success", &self.success)
            .field("served_by", &self.served_by)
            .field("error", &self.error)
            .field("in_place_attempts", &self.in_place_attempts)
            .field("total_backend_calls", &self.total_backend_calls)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
