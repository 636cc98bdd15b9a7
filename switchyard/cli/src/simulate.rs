//! Simulation driver: scripted failures, concurrent routing, reporting

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use switchyard_core::backend::{ScriptedBackend, ScriptedOutcome};
use switchyard_core::routing::{
    BackendRef, ErrorKind, HealthRegistry, InMemoryHealthRegistry, MetricsSnapshot, RetryRule,
    RoutingEngine, RoutingMetrics, RoutingObserver, RoutingReport, Strategy, StrategyTable,
};

// ============================================================================
// Failure Scripts
// ============================================================================

/// `--fail TARGET=KIND[:COUNT]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureSpec {
    /// Backend target the failures apply to
    pub target: String,
    /// Error kind returned
    pub kind: ErrorKind,
    /// Number of failing calls; `None` fails every call
    pub count: Option<usize>,
}

impl FromStr for FailureSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("expected TARGET=KIND[:COUNT], got '{s}'"))?;
        let target = target.trim();
        if target.is_empty() {
            return Err(format!("missing target in '{s}'"));
        }

        let (kind, count) = match rest.split_once(':') {
            Some((kind, count)) => {
                let count = count
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| format!("invalid count in '{s}': {e}"))?;
                (kind, Some(count))
            }
            None => (rest, None),
        };
        let kind = kind.parse::<ErrorKind>().map_err(|e| e.to_string())?;

        Ok(Self {
            target: target.to_string(),
            kind,
            count,
        })
    }
}

impl fmt::Display for FailureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.count {
            Some(count) => write!(f, "{}={}:{count}", self.target, self.kind),
            None => write!(f, "{}={}", self.target, self.kind),
        }
    }
}

// ============================================================================
// Demo Table
// ============================================================================

/// Table used when no routes file exists
pub fn demo_table(logical_name: &str) -> Result<StrategyTable> {
    let table = StrategyTable::new(
        logical_name,
        vec![
            Strategy::new("primary", 300)
                .with_backend_ref(BackendRef::new("primary").with_timeout(Duration::from_secs(5)))
                .with_retry_rule(RetryRule::new(2).retrying([ErrorKind::Unavailable]))
                .with_min_errors_to_disable(1),
            Strategy::new("fallback", 200).with_cooldown(Duration::from_secs(2)),
            Strategy::new("local", 100).with_retry_rule(RetryRule::new(3)),
        ],
    )?;
    Ok(table)
}

// ============================================================================
// Console Reporter
// ============================================================================

/// Prints one line per finished request
struct ConsoleReporter {
    json: bool,
}

impl RoutingObserver for ConsoleReporter {
    fn on_complete(&self, report: &RoutingReport) {
        if self.json {
            match serde_json::to_string(report) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize report"),
            }
            return;
        }

        let outcome = match (&report.strategy_used, &report.last_error) {
            (Some(strategy), _) => format!("served by {strategy}"),
            (None, Some(error)) => format!("FAILED ({error})"),
            (None, None) => "FAILED".to_string(),
        };
        println!(
            "{} [{}] {outcome} attempts={} calls={} failed={:?} skipped={:?} {}ms",
            report.request_id,
            report.logical_name,
            report.total_attempts,
            report.total_backend_calls,
            report.failed_strategy_ids,
            report.skipped_strategy_ids,
            report.elapsed_ms,
        );
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// End-of-run summary
#[derive(Debug, Serialize)]
pub struct Summary {
    /// Aggregated routing metrics
    pub metrics: MetricsSnapshot,
    /// Strategies left disabled by the circuit breaker
    pub disabled: Vec<String>,
}

/// One simulator run
pub struct Simulation {
    engine: RoutingEngine<ScriptedBackend>,
    backend: ScriptedBackend,
    health: Arc<InMemoryHealthRegistry>,
    metrics: Arc<RoutingMetrics>,
    json: bool,
}

impl Simulation {
    /// Wire an engine, registry and metrics around a table
    pub fn new(table: StrategyTable, json: bool) -> Self {
        // Only per-target counts are reported; no call history is kept
        let backend = ScriptedBackend::named("simulator").with_history_limit(0);
        let health = Arc::new(InMemoryHealthRegistry::new());
        let metrics = Arc::new(RoutingMetrics::new());
        let engine = RoutingEngine::new(table, Arc::new(backend.clone()), health.clone())
            .with_observer(metrics.clone())
            .with_observer(Arc::new(ConsoleReporter { json }));

        Self {
            engine,
            backend,
            health,
            metrics,
            json,
        }
    }

    /// Apply `--fail` and `--down` flags to the backend
    pub fn script(&self, failures: &[FailureSpec], down: &[String]) {
        for spec in failures {
            match spec.count {
                Some(count) => self.backend.script(
                    spec.target.clone(),
                    std::iter::repeat(ScriptedOutcome::Fail(spec.kind)).take(count),
                ),
                None => self
                    .backend
                    .set_default(spec.target.clone(), ScriptedOutcome::Fail(spec.kind)),
            }
            tracing::info!(failure = %spec, "Scripted failure");
        }
        for target in down {
            self.backend.set_unavailable(target.clone());
            tracing::info!(backend_target = %target, "Target marked unavailable");
        }
    }

    /// Route `requests` requests, at most `concurrency` at a time
    pub async fn run(&self, requests: usize, concurrency: usize) -> Summary {
        let outcomes: Vec<_> = stream::iter(0..requests)
            .map(|i| self.engine.route(format!("request-{i}")))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if failed > 0 {
            tracing::warn!(failed, total = requests, "Some requests exhausted every strategy");
        }

        Summary {
            metrics: self.metrics.snapshot(),
            disabled: self.health.disabled_strategies(),
        }
    }

    /// Print the end-of-run summary
    pub fn print_summary(&self, summary: &Summary) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(summary)?);
            return Ok(());
        }

        let metrics = &summary.metrics;
        println!();
        println!(
            "{} requests: {} served, {} exhausted, {} fallbacks, {} backend calls",
            metrics.requests,
            metrics.successes,
            metrics.exhaustions,
            metrics.fallbacks,
            metrics.backend_calls
        );
        println!(
            "latency p50={}ms p90={}ms p99={}ms",
            metrics.latency_ms.p50(),
            metrics.latency_ms.p90(),
            metrics.latency_ms.p99()
        );
        for (id, stats) in &metrics.strategies {
            let consecutive = self
                .health
                .snapshot(id)
                .map_or(0, |record| record.consecutive_errors);
            println!(
                "  {id:<16} served={:<4} failed={:<4} skipped={:<4} consecutive_errors={consecutive}",
                stats.served, stats.failed, stats.skipped
            );
        }
        if !summary.disabled.is_empty() {
            println!("disabled: {}", summary.disabled.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_failure_spec() {
        assert_eq!(
            "primary=unavailable".parse::<FailureSpec>(),
            Ok(FailureSpec {
                target: "primary".into(),
                kind: ErrorKind::Unavailable,
                count: None
            })
        );
        assert_eq!(
            "gpt-large=deadline_exceeded:2".parse::<FailureSpec>(),
            Ok(FailureSpec {
                target: "gpt-large".into(),
                kind: ErrorKind::DeadlineExceeded,
                count: Some(2)
            })
        );
    }

    #[test]
    fn test_parse_failure_spec_errors() {
        assert!("primary".parse::<FailureSpec>().is_err());
        assert!("=unavailable".parse::<FailureSpec>().is_err());
        assert!("primary=teapot".parse::<FailureSpec>().is_err());
        assert!("primary=internal:many".parse::<FailureSpec>().is_err());
    }

    #[test]
    fn test_failure_spec_display() {
        let spec: FailureSpec = "a=internal:3".parse().unwrap();
        assert_eq!(spec.to_string(), "a=internal:3");
    }

    #[test]
    fn test_demo_table_order() {
        let table = demo_table("demo").unwrap();
        assert_eq!(table.ids(), vec!["primary", "fallback", "local"]);
    }

    #[tokio::test]
    async fn test_simulation_falls_back_and_disables_primary() {
        let simulation = Simulation::new(demo_table("demo").unwrap(), true);
        let failures = vec!["primary=unavailable".parse::<FailureSpec>().unwrap()];
        simulation.script(&failures, &[]);

        let summary = simulation.run(5, 1).await;

        assert_eq!(summary.metrics.requests, 5);
        assert_eq!(summary.metrics.successes, 5);
        assert_eq!(summary.disabled, vec!["primary".to_string()]);
        assert_eq!(summary.metrics.strategies["fallback"].served, 5);
        // two in-place attempts on the only request that reached primary
        assert_eq!(simulation.backend.call_count("primary"), 2);
    }
}
