//! Routing Engine
//!
//! Drives the select / execute loop for one request at a time:
//!
//! ```text
//!   route(request)
//!        |
//!        v
//!   Router::select_first ---- no eligible ----> Exhausted
//!        |
//!        v
//!   Executor::execute ---- success ----> Routed { served_by, .. }
//!        |
//!        | strategy failed
//!        v
//!   Router::select_next ---- no eligible ----> Exhausted
//!        |
//!        +----> Executor::execute ...
//! ```
//!
//! Many requests may be routed concurrently through one engine; they share
//! only the health registry. Every terminal outcome produces a
//! [`RoutingReport`] delivered to registered [`RoutingObserver`]s.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::RoutingError;
use super::executor::Executor;
use super::health::HealthRegistry;
use super::router::Router;
use super::session::{RoutingPhase, RoutingSession};
use super::strategy::StrategyTable;
use crate::backend::Backend;

// ============================================================================
// Observability
// ============================================================================

/// Summary of one finished routing attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoutingReport {
    /// Request correlation id
    pub request_id: Uuid,
    /// Stable logical name of the table
    pub logical_name: String,
    /// Whether a strategy produced a result
    pub success: bool,
    /// Strategy that served the request
    pub strategy_used: Option<String>,
    /// Strategy selections made (cross-strategy hops)
    pub total_attempts: u32,
    /// Backend invocations made, retries included
    pub total_backend_calls: u32,
    /// Failed strategies in attempt order
    pub failed_strategy_ids: Vec<String>,
    /// Strategies skipped by the router
    pub skipped_strategy_ids: Vec<String>,
    /// Final error message on failure
    pub last_error: Option<String>,
    /// Wall time spent routing
    pub elapsed_ms: u64,
    /// When routing finished
    pub finished_at: DateTime<Utc>,
}

impl RoutingReport {
    fn from_session<Req, Res>(logical_name: &str, session: &RoutingSession<Req, Res>) -> Self {
        let elapsed = session.started_at.elapsed();
        Self {
            request_id: session.request_id,
            logical_name: logical_name.to_string(),
            success: session.success,
            strategy_used: session.served_by.clone(),
            total_attempts: session.attempt_count,
            total_backend_calls: session.total_backend_calls,
            failed_strategy_ids: session.failed_strategy_ids.clone(),
            skipped_strategy_ids: session.skipped_strategy_ids(),
            last_error: session.error.as_ref().map(ToString::to_string),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            finished_at: Utc::now(),
        }
    }

    /// Routing time as a duration
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Number of fallbacks taken before the outcome
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.failed_strategy_ids.len()
    }
}

/// Receives a report for every finished routing attempt
pub trait RoutingObserver: Send + Sync {
    /// Called once per request, after success or exhaustion
    fn on_complete(&self, report: &RoutingReport);
}

// ============================================================================
// Result
// ============================================================================

/// A successfully routed response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routed<Res> {
    /// Request correlation id
    pub request_id: Uuid,
    /// Stable identity callers should report under
    pub logical_name: String,
    /// Strategy that actually produced the response
    pub served_by: String,
    /// Backend response
    pub result: Res,
    /// Strategy selections made
    pub attempt_count: u32,
    /// Backend invocations made, retries included
    pub total_backend_calls: u32,
    /// Strategies that failed before `served_by`
    pub failed_strategy_ids: Vec<String>,
}

// ============================================================================
// Engine
// ============================================================================

/// Routes requests through a strategy table
pub struct RoutingEngine<B: Backend> {
    router: Router,
    executor: Executor<B>,
    observers: Vec<Arc<dyn RoutingObserver>>,
}

impl<B: Backend> RoutingEngine<B> {
    /// Build an engine from its parts
    pub fn new(table: StrategyTable, backend: Arc<B>, health: Arc<dyn HealthRegistry>) -> Self {
        Self {
            router: Router::new(Arc::new(table), health.clone()),
            executor: Executor::new(backend, health),
            observers: Vec::new(),
        }
    }

    /// Register an observer for routing reports
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RoutingObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The router
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The executor
    #[must_use]
    pub fn executor(&self) -> &Executor<B> {
        &self.executor
    }

    /// The strategy table
    #[must_use]
    pub fn table(&self) -> &StrategyTable {
        self.router.table()
    }

    /// The shared health registry
    #[must_use]
    pub fn health(&self) -> &Arc<dyn HealthRegistry> {
        self.router.health()
    }

    /// Route a request until success or exhaustion
    pub async fn route(&self, request: B::Request) -> Result<Routed<B::Response>, RoutingError> {
        self.route_with_cancel(request, CancellationToken::new()).await
    }

    /// Route a request, stopping early if `cancel` fires
    ///
    /// Cancellation fails the in-flight attempt with `Cancelled`; no further
    /// strategies are tried afterwards.
    pub async fn route_with_cancel(
        &self,
        request: B::Request,
        cancel: CancellationToken,
    ) -> Result<Routed<B::Response>, RoutingError> {
        let mut session = self.router.select_first(Arc::new(request))?;

        loop {
            let Some(strategy) = self.router.current(&session) else {
                return Err(self.exhausted(session));
            };

            session = self.executor.execute(session, strategy, &cancel).await;

            if session.success {
                return self.succeeded(session);
            }

            if cancel.is_cancelled() {
                tracing::info!(
                    request_id = %session.request_id,
                    logical_name = %self.table().logical_name(),
                    "Routing cancelled"
                );
                session.phase = RoutingPhase::Exhausted;
                return Err(self.exhausted(session));
            }

            tracing::info!(
                request_id = %session.request_id,
                from = %strategy.id,
                failed = session.failed_strategy_ids.len(),
                "Falling back to next strategy"
            );
            session = self.router.select_next(session)?;
        }
    }

    fn succeeded(
        &self,
        session: RoutingSession<B::Request, B::Response>,
    ) -> Result<Routed<B::Response>, RoutingError> {
        let logical_name = self.table().logical_name().to_string();
        let report = RoutingReport::from_session(&logical_name, &session);
        self.notify(&report);

        tracing::info!(
            request_id = %report.request_id,
            logical_name = %logical_name,
            strategy = report.strategy_used.as_deref().unwrap_or_default(),
            attempts = report.total_attempts,
            backend_calls = report.total_backend_calls,
            elapsed_ms = report.elapsed_ms,
            "Request routed"
        );

        let RoutingSession {
            request_id,
            served_by,
            result,
            attempt_count,
            total_backend_calls,
            failed_strategy_ids,
            failures,
            skipped,
            ..
        } = session;

        match (served_by, result) {
            (Some(served_by), Some(result)) => Ok(Routed {
                request_id,
                logical_name,
                served_by,
                result,
                attempt_count,
                total_backend_calls,
                failed_strategy_ids,
            }),
            _ => Err(RoutingError::AllStrategiesExhausted {
                logical_name,
                failures,
                skipped,
            }),
        }
    }

    fn exhausted(&self, session: RoutingSession<B::Request, B::Response>) -> RoutingError {
        let logical_name = self.table().logical_name().to_string();
        let report = RoutingReport::from_session(&logical_name, &session);
        self.notify(&report);

        tracing::warn!(
            request_id = %report.request_id,
            logical_name = %logical_name,
            failed = ?report.failed_strategy_ids,
            skipped = ?report.skipped_strategy_ids,
            backend_calls = report.total_backend_calls,
            "All strategies exhausted"
        );

        RoutingError::AllStrategiesExhausted {
            logical_name,
            failures: session.failures,
            skipped: session.skipped,
        }
    }

    fn notify(&self, report: &RoutingReport) {
        for observer in &self.observers {
            observer.on_complete(report);
        }
    }
}

impl<B: Backend> std::fmt::Debug for RoutingEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("router", &self.router)
            .field("executor", &self.executor)
            .field("observers", &self.observers.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ScriptedBackend, ScriptedOutcome};
    use crate::routing::error::ErrorKind;
    use crate::routing::health::InMemoryHealthRegistry;
    use crate::routing::strategy::{RetryRule, Strategy};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Collector {
        reports: Mutex<Vec<RoutingReport>>,
    }

    impl RoutingObserver for Collector {
        fn on_complete(&self, report: &RoutingReport) {
            self.reports.lock().push(report.clone());
        }
    }

    fn engine(
        strategies: Vec<Strategy>,
    ) -> (RoutingEngine<ScriptedBackend>, ScriptedBackend, Arc<Collector>) {
        let backend = ScriptedBackend::new();
        let collector = Arc::new(Collector::default());
        let engine = RoutingEngine::new(
            StrategyTable::new("chat", strategies).unwrap(),
            Arc::new(backend.clone()),
            Arc::new(InMemoryHealthRegistry::new()),
        )
        .with_observer(collector.clone());
        (engine, backend, collector)
    }

    #[tokio::test]
    async fn test_route_success_reports_once() {
        let (engine, _, collector) = engine(vec![Strategy::new("a", 1)]);

        let routed = engine.route("hi".to_string()).await.unwrap();

        assert_eq!(routed.served_by, "a");
        assert_eq!(routed.logical_name, "chat");
        assert_eq!(routed.attempt_count, 1);

        let reports = collector.reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].success);
        assert_eq!(reports[0].strategy_used.as_deref(), Some("a"));
        assert_eq!(reports[0].request_id, routed.request_id);
    }

    #[tokio::test]
    async fn test_route_falls_back_and_counts_separately() {
        let (engine, backend, collector) = engine(vec![
            Strategy::new("a", 2).with_retry_rule(RetryRule::new(3)),
            Strategy::new("b", 1),
        ]);
        backend.set_default("a", ScriptedOutcome::Fail(ErrorKind::Unavailable));

        let routed = engine.route("hi".to_string()).await.unwrap();

        assert_eq!(routed.served_by, "b");
        assert_eq!(routed.failed_strategy_ids, vec!["a".to_string()]);
        assert_eq!(routed.attempt_count, 2);
        assert_eq!(routed.total_backend_calls, 4);

        let reports = collector.reports.lock();
        assert_eq!(reports[0].fallback_count(), 1);
    }

    #[tokio::test]
    async fn test_route_exhaustion_reports_failure() {
        let (engine, backend, collector) =
            engine(vec![Strategy::new("a", 2), Strategy::new("b", 1)]);
        backend.set_default("a", ScriptedOutcome::Fail(ErrorKind::Internal));
        backend.set_default("b", ScriptedOutcome::Fail(ErrorKind::NotFound));

        let err = engine.route("hi".to_string()).await.unwrap_err();

        assert_eq!(err.failed_strategy_ids(), vec!["a", "b"]);
        let reports = collector.reports.lock();
        assert!(!reports[0].success);
        assert_eq!(reports[0].last_error.as_deref(), Some("no available strategies"));
    }

    #[tokio::test]
    async fn test_pre_cancelled_route_does_not_touch_health() {
        let (engine, backend, collector) = engine(vec![
            Strategy::new("p", 2).with_min_errors_to_disable(1),
            Strategy::new("f", 1),
        ]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .route_with_cancel("hi".to_string(), cancel)
            .await
            .unwrap_err();

        assert!(err.failed_strategy_ids().is_empty());
        assert_eq!(backend.total_calls(), 0);
        assert!(engine.health().snapshot("p").is_none());
        {
            let reports = collector.reports.lock();
            assert_eq!(reports[0].total_backend_calls, 0);
            assert_eq!(reports[0].last_error.as_deref(), Some("cancelled: call cancelled"));
        }

        // the next request is still served by the healthy primary
        let routed = engine.route("again".to_string()).await.unwrap();
        assert_eq!(routed.served_by, "p");
        assert!(routed.failed_strategy_ids.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_in_flight_stops_after_current_strategy() {
        let (engine, backend, _) = engine(vec![Strategy::new("a", 2), Strategy::new("b", 1)]);
        backend.push("a", ScriptedOutcome::Hang);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        let err = engine
            .route_with_cancel("hi".to_string(), cancel)
            .await
            .unwrap_err();

        assert_eq!(err.failed_strategy_ids(), vec!["a"]);
        assert_eq!(backend.call_count("b"), 0);
        match err {
            RoutingError::AllStrategiesExhausted { failures, .. } => {
                assert_eq!(failures[0].error.kind, ErrorKind::Cancelled);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_report_json_field_names() {
        let (engine, backend, collector) =
            engine(vec![Strategy::new("a", 2), Strategy::new("b", 1)]);
        backend.push("a", ScriptedOutcome::Fail(ErrorKind::Unavailable));

        engine.route("hi".to_string()).await.unwrap();

        let report = collector.reports.lock()[0].clone();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["logical_name"], "chat");
        assert_eq!(json["success"], true);
        assert_eq!(json["strategy_used"], "b");
        assert_eq!(json["total_attempts"], 2);
        assert_eq!(json["total_backend_calls"], 2);
        assert_eq!(json["failed_strategy_ids"], serde_json::json!(["a"]));
        assert_eq!(json["skipped_strategy_ids"], serde_json::json!([]));
        assert!(json["last_error"].is_null());
        assert!(json["request_id"].is_string());
        assert!(json["elapsed_ms"].is_u64());
        assert!(json["finished_at"].is_string());
    }
}
