//! Strategy Table
//!
//! An immutable, priority-ordered list of candidate backend strategies for one
//! logical request type.
//!
//! ```text
//! StrategyTable "chat-completion"
//!   [0] primary   priority 300   retry: 3x unavailable   disable after 1
//!   [1] fallback  priority 200   retry: none             cooldown 5s
//!   [2] local     priority 100   retry: 2x any transient
//! ```
//!
//! Ordering is decided once at construction: priority descending, ties kept in
//! the order the strategies were supplied.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ConfigurationError, ErrorKind};

// ============================================================================
// Backend Reference
// ============================================================================

/// Opaque handle a backend uses to perform the call
///
/// The routing core never interprets these fields; they are handed to
/// [`crate::backend::Backend::invoke`] as-is. The one exception is `timeout`,
/// which the executor enforces around each call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRef {
    /// Model name, endpoint or other target identifier
    pub target: String,
    /// Per-call timeout (independent of the error cooldown window)
    pub timeout: Option<Duration>,
    /// Backend-specific parameters passed through untouched
    pub params: BTreeMap<String, String>,
}

impl BackendRef {
    /// Reference a target with no timeout or params
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            timeout: None,
            params: BTreeMap::new(),
        }
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a pass-through parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff between in-place retries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay before the first retry
    pub initial: Duration,
    /// Upper bound on the delay (before jitter)
    pub max: Duration,
    /// Growth factor per retry
    pub multiplier: f64,
    /// Add up to 25% random jitter
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Zero delay between retries
    #[must_use]
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Fixed delay with no growth and no jitter
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before the given retry (0 = first retry)
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max.as_secs_f64());

        let secs = if self.jitter {
            // Up to 25% on top of the capped delay
            let jitter = rand::random::<f64>() * 0.25;
            capped * (1.0 + jitter)
        } else {
            capped
        };

        Duration::try_from_secs_f64(secs).unwrap_or(self.max)
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// One in-place retry rule
///
/// A rule matches an error kind when the kind is not ignored and either the
/// retryable list is empty (any transient kind) or it names the kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryRule {
    /// Total attempts allowed on the strategy (first call included)
    pub max_attempts: u32,
    /// Kinds this rule retries; empty means every transient kind
    pub retryable_error_kinds: Vec<ErrorKind>,
    /// Kinds this rule never retries
    pub ignored_error_kinds: Vec<ErrorKind>,
    /// Delay between attempts; `None` retries immediately
    pub backoff: Option<Backoff>,
}

impl RetryRule {
    /// Rule allowing `max_attempts` total attempts for any transient kind
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retryable_error_kinds: Vec::new(),
            ignored_error_kinds: Vec::new(),
            backoff: None,
        }
    }

    /// Restrict the rule to the given kinds
    #[must_use]
    pub fn retrying(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_error_kinds.extend(kinds);
        self
    }

    /// Exclude the given kinds from the rule
    #[must_use]
    pub fn ignoring(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.ignored_error_kinds.extend(kinds);
        self
    }

    /// Sleep between attempts
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Whether this rule governs the given kind
    #[must_use]
    pub fn matches(&self, kind: ErrorKind) -> bool {
        if self.ignored_error_kinds.contains(&kind) {
            return false;
        }
        self.retryable_error_kinds.is_empty() || self.retryable_error_kinds.contains(&kind)
    }
}

/// Ordered list of retry rules; first match wins
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Rules in evaluation order
    pub rules: Vec<RetryRule>,
}

impl RetryPolicy {
    /// Policy that never retries in place
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Policy from an ordered list of rules
    #[must_use]
    pub fn from_rules(rules: Vec<RetryRule>) -> Self {
        Self { rules }
    }

    /// Rule governing the given kind, if any
    ///
    /// Permanent kinds never have a rule, whatever the rules say.
    #[must_use]
    pub fn rule_for(&self, kind: ErrorKind) -> Option<&RetryRule> {
        if kind.is_permanent() {
            return None;
        }
        self.rules.iter().find(|rule| rule.matches(kind))
    }

    /// Whether the policy has no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// One ranked candidate backend target
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Unique identifier within a table
    pub id: String,
    /// Higher is tried first
    pub priority: i32,
    /// Handle passed to the backend
    pub backend_ref: BackendRef,
    /// In-place retry rules
    pub retry_policy: RetryPolicy,
    /// Skip window after a recorded failure
    pub error_cooldown_period: Option<Duration>,
    /// Consecutive failures before the strategy is disabled
    pub min_errors_to_disable: Option<u32>,
}

impl Strategy {
    /// Strategy whose backend target defaults to its id
    pub fn new(id: impl Into<String>, priority: i32) -> Self {
        let id = id.into();
        Self {
            backend_ref: BackendRef::new(id.clone()),
            id,
            priority,
            retry_policy: RetryPolicy::none(),
            error_cooldown_period: None,
            min_errors_to_disable: None,
        }
    }

    /// Replace the backend reference
    #[must_use]
    pub fn with_backend_ref(mut self, backend_ref: BackendRef) -> Self {
        self.backend_ref = backend_ref;
        self
    }

    /// Point the backend reference at a different target
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.backend_ref.target = target.into();
        self
    }

    /// Append a retry rule
    #[must_use]
    pub fn with_retry_rule(mut self, rule: RetryRule) -> Self {
        self.retry_policy.rules.push(rule);
        self
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Skip this strategy for `period` after each recorded failure
    #[must_use]
    pub fn with_cooldown(mut self, period: Duration) -> Self {
        self.error_cooldown_period = Some(period);
        self
    }

    /// Disable this strategy after `count` consecutive failures
    #[must_use]
    pub fn with_min_errors_to_disable(mut self, count: u32) -> Self {
        self.min_errors_to_disable = Some(count);
        self
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.id.trim().is_empty() {
            return Err(ConfigurationError::EmptyStrategyId);
        }
        if self.min_errors_to_disable == Some(0) {
            return Err(ConfigurationError::InvalidDisableThreshold(self.id.clone()));
        }
        if let Some(index) = self
            .retry_policy
            .rules
            .iter()
            .position(|rule| rule.max_attempts == 0)
        {
            return Err(ConfigurationError::InvalidRetryRule {
                strategy: self.id.clone(),
                index,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Strategy Table
// ============================================================================

/// Immutable, priority-ordered strategies for one logical request type
#[derive(Clone, Debug)]
pub struct StrategyTable {
    logical_name: String,
    strategies: Vec<Strategy>,
}

impl StrategyTable {
    /// Validate and sort the strategies
    ///
    /// Fails on an empty list, duplicate or empty ids, a retry rule with zero
    /// attempts, or a zero disable threshold.
    pub fn new(
        logical_name: impl Into<String>,
        strategies: Vec<Strategy>,
    ) -> Result<Self, ConfigurationError> {
        if strategies.is_empty() {
            return Err(ConfigurationError::NoStrategies);
        }

        {
            let mut seen = HashSet::with_capacity(strategies.len());
            for strategy in &strategies {
                strategy.validate()?;
                if !seen.insert(strategy.id.as_str()) {
                    return Err(ConfigurationError::DuplicateStrategy(strategy.id.clone()));
                }
            }
        }

        let mut strategies = strategies;
        // sort_by is stable, so equal priorities keep their input order
        strategies.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(Self {
            logical_name: logical_name.into(),
            strategies,
        })
    }

    /// Logical request type served by this table
    #[must_use]
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Number of strategies
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Always false for a constructed table
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy at a sorted position
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Strategy> {
        self.strategies.get(index)
    }

    /// Strategy by id
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.id == id)
    }

    /// Sorted position of a strategy id
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.strategies.iter().position(|s| s.id == id)
    }

    /// Strategy by id, or [`ConfigurationError::UnknownStrategy`]
    pub fn require(&self, id: &str) -> Result<&Strategy, ConfigurationError> {
        self.find(id)
            .ok_or_else(|| ConfigurationError::UnknownStrategy(id.to_string()))
    }

    /// Strategies in selection order
    pub fn iter(&self) -> impl Iterator<Item = &Strategy> {
        self.strategies.iter()
    }

    /// Ids in selection order
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.id.as_str()).collect()
    }

    /// Position of the lowest-priority strategy
    #[must_use]
    pub fn last_index(&self) -> usize {
        self.strategies.len().saturating_sub(1)
    }
}
