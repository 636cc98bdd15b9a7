//! Routing Metrics
//!
//! Aggregates [`RoutingReport`]s into counters and a latency histogram:
//! - Requests, successes and exhaustions
//! - Fallbacks taken and backend calls made
//! - Per-strategy served / failed / skipped counts
//! - Routing latency (p50 / p90 / p99)
//!
//! [`RoutingMetrics`] is a [`RoutingObserver`], so it plugs straight into
//! [`RoutingEngine::with_observer`](super::RoutingEngine::with_observer).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use super::engine::{RoutingObserver, RoutingReport};

// ============================================================================
// Histogram for Latency Tracking
// ============================================================================

/// A histogram for tracking latency distributions (milliseconds)
#[derive(Debug)]
pub struct Histogram {
    /// Bucket upper bounds
    buckets: Vec<u64>,
    /// Count per bucket; the last slot catches values above every bound
    counts: Vec<AtomicU64>,
    total_count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    /// Create a histogram with the given bucket upper bounds
    #[must_use]
    pub fn new(mut buckets: Vec<u64>) -> Self {
        buckets.sort_unstable();
        buckets.dedup();
        let counts = (0..=buckets.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            total_count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    /// Default latency buckets
    #[must_use]
    pub fn latency_default() -> Self {
        Self::new(vec![
            1, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 60_000,
        ])
    }

    /// Record a value
    pub fn record(&self, value: u64) {
        let bucket_idx = self
            .buckets
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.buckets.len());

        self.counts[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.total_count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    /// Get histogram snapshot
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let counts: Vec<u64> = self
            .counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect();
        let total = self.total_count.load(Ordering::Relaxed);
        let sum = self.sum.load(Ordering::Relaxed);
        let min = self.min.load(Ordering::Relaxed);

        HistogramSnapshot {
            buckets: self.buckets.clone(),
            counts,
            total,
            sum,
            min: if min == u64::MAX { 0 } else { min },
            max: self.max.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of histogram data
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistogramSnapshot {
    /// Bucket upper bounds
    pub buckets: Vec<u64>,
    /// Count per bucket plus one overflow slot
    pub counts: Vec<u64>,
    /// Values recorded
    pub total: u64,
    /// Sum of values recorded
    pub sum: u64,
    /// Smallest value (0 when empty)
    pub min: u64,
    /// Largest value
    pub max: u64,
}

impl HistogramSnapshot {
    /// Mean value (0 when empty)
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.sum as f64 / self.total as f64
    }

    /// Upper bound of the bucket containing the `p` quantile
    ///
    /// Overflow values report the observed maximum.
    #[must_use]
    pub fn percentile(&self, p: f64) -> u64 {
        if self.total == 0 {
            return 0;
        }

        let target = ((self.total as f64) * p.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return self.buckets.get(i).copied().unwrap_or(self.max).min(self.max);
            }
        }

        self.max
    }

    /// Get p50
    #[must_use]
    pub fn p50(&self) -> u64 {
        self.percentile(0.5)
    }

    /// Get p90
    #[must_use]
    pub fn p90(&self) -> u64 {
        self.percentile(0.9)
    }

    /// Get p99
    #[must_use]
    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }
}

// ============================================================================
// Counter
// ============================================================================

/// A simple atomic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Counter starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n`
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Routing Metrics
// ============================================================================

#[derive(Debug, Default)]
struct StrategyCounters {
    served: Counter,
    failed: Counter,
    skipped: Counter,
}

/// Per-strategy counts in a [`MetricsSnapshot`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StrategyStats {
    /// Requests this strategy produced the result for
    pub served: u64,
    /// Times it was declared failed
    pub failed: u64,
    /// Times the router skipped it
    pub skipped: u64,
}

/// Aggregated routing metrics
#[derive(Debug)]
pub struct RoutingMetrics {
    requests: Counter,
    successes: Counter,
    exhaustions: Counter,
    fallbacks: Counter,
    backend_calls: Counter,
    latency_ms: Histogram,
    strategies: DashMap<String, StrategyCounters>,
}

impl Default for RoutingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingMetrics {
    /// Empty metrics with default latency buckets
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Counter::new(),
            successes: Counter::new(),
            exhaustions: Counter::new(),
            fallbacks: Counter::new(),
            backend_calls: Counter::new(),
            latency_ms: Histogram::latency_default(),
            strategies: DashMap::new(),
        }
    }

    /// Fold one report into the totals
    pub fn record(&self, report: &RoutingReport) {
        self.requests.inc();
        if report.success {
            self.successes.inc();
        } else {
            self.exhaustions.inc();
        }
        self.fallbacks.add(report.fallback_count() as u64);
        self.backend_calls.add(u64::from(report.total_backend_calls));
        self.latency_ms.record(report.elapsed_ms);

        if let Some(served_by) = &report.strategy_used {
            self.strategies
                .entry(served_by.clone())
                .or_default()
                .served
                .inc();
        }
        for id in &report.failed_strategy_ids {
            self.strategies.entry(id.clone()).or_default().failed.inc();
        }
        for id in &report.skipped_strategy_ids {
            self.strategies.entry(id.clone()).or_default().skipped.inc();
        }
    }

    /// Point-in-time copy of every counter
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let strategies = self
            .strategies
            .iter()
            .map(|entry| {
                let counters = entry.value();
                (
                    entry.key().clone(),
                    StrategyStats {
                        served: counters.served.get(),
                        failed: counters.failed.get(),
                        skipped: counters.skipped.get(),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            requests: self.requests.get(),
            successes: self.successes.get(),
            exhaustions: self.exhaustions.get(),
            fallbacks: self.fallbacks.get(),
            backend_calls: self.backend_calls.get(),
            latency_ms: self.latency_ms.snapshot(),
            strategies,
        }
    }
}

impl RoutingObserver for RoutingMetrics {
    fn on_complete(&self, report: &RoutingReport) {
        self.record(report);
    }
}

/// Serializable view of [`RoutingMetrics`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests routed
    pub requests: u64,
    /// Requests that got a result
    pub successes: u64,
    /// Requests that exhausted every strategy
    pub exhaustions: u64,
    /// Strategy-level failures that led to a fallback or exhaustion
    pub fallbacks: u64,
    /// Backend invocations, retries included
    pub backend_calls: u64,
    /// Routing latency distribution
    pub latency_ms: HistogramSnapshot,
    /// Per-strategy counts, sorted by id
    pub strategies: BTreeMap<String, StrategyStats>,
}

impl MetricsSnapshot {
    /// Fraction of requests that succeeded (1.0 when idle)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 1.0;
        }
        self.successes as f64 / self.requests as f64
    }
}

// ============================================================================
// Tests
// ============================================================================
