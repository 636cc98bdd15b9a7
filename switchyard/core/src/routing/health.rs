//! Strategy Health Registry and Circuit Breaker
//!
//! Tracks per-strategy failure state shared by every routing loop in the
//! process:
//!
//! ```text
//!              record_failure                 consecutive >= min_errors_to_disable
//! (no record) ----------------> [cooling down] -----------------------------------> [disabled]
//!                                  |      ^                                            |
//!                cooldown elapsed  |      | record_failure                  reset()    |
//!                                  v      |                                            |
//!                               [eligible] <-------------------------------------------+
//! ```
//!
//! - Records are created lazily on the first failure; a success never
//!   creates one.
//! - Disabling is permanent until [`HealthRegistry::reset`]. There is no
//!   half-open probe.
//! - Cooldown is evaluated at read time against the injected [`Clock`].
//!
//! # Thread Safety
//!
//! [`InMemoryHealthRegistry`] keeps records in a `DashMap`. Every mutation runs
//! under the shard lock for its key, so updates are linearizable per strategy
//! id and readers always copy out a whole [`HealthRecord`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::clock::{Clock, SystemClock};
use super::error::SkipReason;
use super::strategy::Strategy;

// ============================================================================
// Health Record
// ============================================================================

/// Failure state of one strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthRecord {
    /// Strategy-level failures since the last success
    pub consecutive_errors: u32,
    /// When the most recent failure was recorded
    pub last_error_time: Instant,
    /// Tripped by reaching `min_errors_to_disable`
    pub disabled: bool,
    /// Lifetime strategy-level failures
    pub total_failures: u64,
    /// Lifetime successes observed after the record was created
    pub total_successes: u64,
}

impl HealthRecord {
    fn is_cooling_down(&self, strategy: &Strategy, now: Instant) -> bool {
        strategy
            .error_cooldown_period
            .is_some_and(|cooldown| self.since_last_error(now) < cooldown)
    }

    fn first_failure(now: Instant) -> Self {
        Self {
            consecutive_errors: 0,
            last_error_time: now,
            disabled: false,
            total_failures: 0,
            total_successes: 0,
        }
    }

    /// Time since the last failure, measured at `now`
    #[must_use]
    pub fn since_last_error(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_error_time)
    }
}

// ============================================================================
// Registry Trait
// ============================================================================

/// Store of per-strategy health, shared across routing loops
///
/// Implementations must make each mutation atomic per strategy id and must
/// never expose a partially applied update.
pub trait HealthRegistry: Send + Sync {
    /// A record exists, the strategy has a cooldown, and it has not elapsed
    fn is_in_cooldown(&self, strategy: &Strategy) -> bool;

    /// A record exists and is disabled
    fn is_disabled(&self, strategy: &Strategy) -> bool;

    /// Record a strategy-level failure and return the updated record
    fn record_failure(&self, strategy: &Strategy) -> HealthRecord;

    /// Reset the consecutive error count; leaves `disabled` untouched
    ///
    /// Must not create a record for a strategy that has none.
    fn record_success(&self, strategy: &Strategy);

    /// Forget everything about a strategy, re-enabling it
    ///
    /// Returns whether a record existed.
    fn reset(&self, strategy_id: &str) -> bool;

    /// Copy of the current record, if any
    fn snapshot(&self, strategy_id: &str) -> Option<HealthRecord>;

    /// Why the router should skip this strategy right now, if at all
    fn skip_reason(&self, strategy: &Strategy) -> Option<SkipReason> {
        if self.is_disabled(strategy) {
            Some(SkipReason::Disabled)
        } else if self.is_in_cooldown(strategy) {
            Some(SkipReason::CoolingDown)
        } else {
            None
        }
    }
}

// ============================================================================
// In-Memory Registry
// ============================================================================

/// Concurrent in-process [`HealthRegistry`]
pub struct InMemoryHealthRegistry {
    records: DashMap<String, HealthRecord>,
    clock: Arc<dyn Clock>,
}

impl InMemoryHealthRegistry {
    /// Registry using the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Registry using a custom clock
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// All records, keyed by strategy id
    #[must_use]
    pub fn snapshots(&self) -> Vec<(String, HealthRecord)> {
        let mut out: Vec<_> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Ids of disabled strategies, sorted
    #[must_use]
    pub fn disabled_strategies(&self) -> Vec<String> {
        self.snapshots()
            .into_iter()
            .filter(|(_, record)| record.disabled)
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of strategies with a record
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no strategy has failed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record
    pub fn clear(&self) {
        self.records.clear();
    }
}

impl Default for InMemoryHealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry for InMemoryHealthRegistry {
    fn is_in_cooldown(&self, strategy: &Strategy) -> bool {
        self.snapshot(&strategy.id)
            .is_some_and(|record| record.is_cooling_down(strategy, self.clock.now()))
    }

    fn is_disabled(&self, strategy: &Strategy) -> bool {
        self.records
            .get(&strategy.id)
            .is_some_and(|record| record.disabled)
    }

    fn record_failure(&self, strategy: &Strategy) -> HealthRecord {
        let now = self.clock.now();
        let mut entry = self
            .records
            .entry(strategy.id.clone())
            .or_insert_with(|| HealthRecord::first_failure(now));

        let record = entry.value_mut();
        let was_disabled = record.disabled;
        record.consecutive_errors = record.consecutive_errors.saturating_add(1);
        record.total_failures = record.total_failures.saturating_add(1);
        record.last_error_time = now;
        if let Some(threshold) = strategy.min_errors_to_disable {
            if record.consecutive_errors >= threshold {
                record.disabled = true;
            }
        }
        let updated = *record;
        drop(entry);

        if updated.disabled && !was_disabled {
            tracing::warn!(
                strategy = %strategy.id,
                consecutive_errors = updated.consecutive_errors,
                "Strategy disabled after consecutive failures"
            );
        } else {
            tracing::debug!(
                strategy = %strategy.id,
                consecutive_errors = updated.consecutive_errors,
                "Recorded strategy failure"
            );
        }

        updated
    }

    fn record_success(&self, strategy: &Strategy) {
        if let Some(mut record) = self.records.get_mut(&strategy.id) {
            record.consecutive_errors = 0;
            record.total_successes = record.total_successes.saturating_add(1);
        }
    }

    fn reset(&self, strategy_id: &str) -> bool {
        let existed = self.records.remove(strategy_id).is_some();
        if existed {
            tracing::info!(strategy = %strategy_id, "Strategy health reset");
        }
        existed
    }

    fn snapshot(&self, strategy_id: &str) -> Option<HealthRecord> {
        self.records.get(strategy_id).map(|record| *record)
    }

    // Both checks read one copy of the record
    fn skip_reason(&self, strategy: &Strategy) -> Option<SkipReason> {
        let record = self.snapshot(&strategy.id)?;
        if record.disabled {
            Some(SkipReason::Disabled)
        } else if record.is_cooling_down(strategy, self.clock.now()) {
            Some(SkipReason::CoolingDown)
        } else {
            None
        }
    }
}

impl fmt::Debug for InMemoryHealthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryHealthRegistry")
            .field("strategies", &self.records.len())
            .field("disabled", &self.disabled_strategies())
            .field("clock", &self.clock)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
