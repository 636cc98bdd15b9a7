//! Strategy Executor
//!
//! Runs the selected strategy against the backend, retrying in place while
//! the strategy's retry policy allows, and records exactly one terminal
//! outcome in the health registry.
//!
//! ```text
//!            +---------------- retry (rule matches, attempts left) ----+
//!            v                                                          |
//! invoke backend ---- Ok ----> record_success ---> Succeeded            |
//!            |                                                          |
//!            +------ Err ---> rule_for(kind)? ---------------------------+
//!                                  | no rule / permanent / exhausted
//!                                  v
//!                            record_failure ---> Advancing
//! ```
//!
//! Only `in_place_attempts` and `total_backend_calls` grow here; the
//! cross-strategy `attempt_count` belongs to the router.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::{BackendError, StrategyFailure};
use super::health::HealthRegistry;
use super::session::{RoutingPhase, RoutingSession, SessionError};
use super::strategy::Strategy;
use crate::backend::Backend;

/// Invokes strategies through a backend
pub struct Executor<B: Backend> {
    backend: Arc<B>,
    health: Arc<dyn HealthRegistry>,
}

impl<B: Backend> Executor<B> {
    /// Create an executor over a backend and registry
    pub fn new(backend: Arc<B>, health: Arc<dyn HealthRegistry>) -> Self {
        Self { backend, health }
    }

    /// The backend calls are made through
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Run one strategy to a terminal outcome
    ///
    /// Returns the session in phase `Succeeded` or `Advancing`. A token that
    /// is already cancelled returns immediately with a `Cancelled` error and
    /// no backend call, counter change or health mutation.
    pub async fn execute(
        &self,
        mut session: RoutingSession<B::Request, B::Response>,
        strategy: &Strategy,
        cancel: &CancellationToken,
    ) -> RoutingSession<B::Request, B::Response> {
        if cancel.is_cancelled() {
            return abandon(session, strategy);
        }

        session.phase = RoutingPhase::Executing;
        session.in_place_attempts = 0;

        loop {
            session.in_place_attempts += 1;
            session.total_backend_calls += 1;

            tracing::debug!(
                request_id = %session.request_id,
                strategy = %strategy.id,
                backend_target = %strategy.backend_ref.target,
                attempt = session.in_place_attempts,
                "Invoking backend"
            );

            let request = Arc::clone(&session.original_request);
            let error = match self.invoke_once(&request, strategy, cancel).await {
                Ok(response) => {
                    self.health.record_success(strategy);
                    session.success = true;
                    session.result = Some(response);
                    session.served_by = Some(strategy.id.clone());
                    session.error = None;
                    session.phase = RoutingPhase::Succeeded;
                    return session;
                }
                Err(error) => error,
            };

            let rule = strategy.retry_policy.rule_for(error.kind);
            let retry = rule.filter(|rule| {
                session.in_place_attempts < rule.max_attempts && !cancel.is_cancelled()
            });

            if let Some(rule) = retry {
                session.phase = RoutingPhase::RetryingSameStrategy;
                tracing::debug!(
                    request_id = %session.request_id,
                    strategy = %strategy.id,
                    kind = %error.kind,
                    attempt = session.in_place_attempts,
                    max_attempts = rule.max_attempts,
                    "Retrying strategy in place"
                );
                session.error = Some(SessionError::Backend(error.clone()));

                if let Some(backoff) = &rule.backoff {
                    let delay = backoff.delay_for_retry(session.in_place_attempts - 1);
                    backoff_sleep(delay, cancel).await;
                }
                // Cancelled during backoff: the strategy still failed on `error`
                if cancel.is_cancelled() {
                    return self.fail_strategy(session, strategy, error);
                }
                continue;
            }

            return self.fail_strategy(session, strategy, error);
        }
    }

    async fn invoke_once(
        &self,
        request: &B::Request,
        strategy: &Strategy,
        cancel: &CancellationToken,
    ) -> Result<B::Response, BackendError> {
        let call = async {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(BackendError::cancelled()),
                result = self.backend.invoke(
                    request,
                    &strategy.backend_ref,
                    cancel.child_token(),
                ) => result,
            }
        };

        match strategy.backend_ref.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::timed_out(limit)),
            },
            None => call.await,
        }
    }

    fn fail_strategy(
        &self,
        mut session: RoutingSession<B::Request, B::Response>,
        strategy: &Strategy,
        error: BackendError,
    ) -> RoutingSession<B::Request, B::Response> {
        let record = self.health.record_failure(strategy);

        tracing::warn!(
            request_id = %session.request_id,
            strategy = %strategy.id,
            kind = %error.kind,
            attempts = session.in_place_attempts,
            consecutive_errors = record.consecutive_errors,
            error = %error.message,
            "Strategy failed"
        );

        session.failed_strategy_ids.push(strategy.id.clone());
        session.failures.push(StrategyFailure {
            strategy_id: strategy.id.clone(),
            error: error.clone(),
            attempts: session.in_place_attempts,
        });
        session.success = false;
        session.error = Some(SessionError::Backend(error));
        session.phase = RoutingPhase::Advancing;
        session
    }
}

/// Give up on a strategy before any call was made
fn abandon<Req, Res>(
    mut session: RoutingSession<Req, Res>,
    strategy: &Strategy,
) -> RoutingSession<Req, Res> {
    tracing::debug!(
        request_id = %session.request_id,
        strategy = %strategy.id,
        "Request cancelled before invoking strategy"
    );
    session.success = false;
    session.error = Some(SessionError::Backend(BackendError::cancelled()));
    session.phase = RoutingPhase::Advancing;
    session
}

/// Backoff delay between in-place attempts; returns early on cancellation
async fn backoff_sleep(delay: Duration, cancel: &CancellationToken) {
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(delay) => {}
    }
}

impl<B: Backend> std::fmt::Debug for Executor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
