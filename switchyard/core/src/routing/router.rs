//! Strategy Router
//!
//! Picks the next eligible strategy for a session. The table is already
//! sorted by priority, so selection is a forward walk from the session's
//! current index that skips disabled and cooling-down strategies.
//!
//! ```text
//! index:   0          1          2          3 (= len)
//!        [primary]  [fallback] [local]    | exhausted
//!          disabled   cooling    eligible
//!          skip ----> skip ----> select
//! ```

use std::sync::Arc;

use super::error::{ConfigurationError, RoutingError, SkippedStrategy};
use super::health::HealthRegistry;
use super::session::{RoutingPhase, RoutingSession, SessionError};
use super::strategy::{Strategy, StrategyTable};

/// Selects strategies from a table using shared health state
#[derive(Clone)]
pub struct Router {
    table: Arc<StrategyTable>,
    health: Arc<dyn HealthRegistry>,
}

impl Router {
    /// Create a router over a table and registry
    pub fn new(table: Arc<StrategyTable>, health: Arc<dyn HealthRegistry>) -> Self {
        Self { table, health }
    }

    /// The table this router selects from
    #[must_use]
    pub fn table(&self) -> &StrategyTable {
        &self.table
    }

    /// The registry consulted for eligibility
    #[must_use]
    pub fn health(&self) -> &Arc<dyn HealthRegistry> {
        &self.health
    }

    /// Strategy the session currently points at, if any
    #[must_use]
    pub fn current<Req, Res>(&self, session: &RoutingSession<Req, Res>) -> Option<&Strategy> {
        self.table.get(session.current_strategy_index)
    }

    /// Start routing a new request
    ///
    /// The session begins at index 0 with `attempt_count = 1` and is moved
    /// forward past any ineligible strategies.
    pub fn select_first<Req, Res>(
        &self,
        request: Arc<Req>,
    ) -> Result<RoutingSession<Req, Res>, RoutingError> {
        self.ensure_configured()?;
        let mut session = RoutingSession::new(request);
        self.walk(&mut session);
        Ok(session)
    }

    /// Loop back after a strategy-level failure
    ///
    /// Advances the index and `attempt_count` by one, then walks forward
    /// past ineligible strategies.
    pub fn select_next<Req, Res>(
        &self,
        mut session: RoutingSession<Req, Res>,
    ) -> Result<RoutingSession<Req, Res>, RoutingError> {
        self.ensure_configured()?;
        session.advance();
        self.walk(&mut session);
        Ok(session)
    }

    fn ensure_configured(&self) -> Result<(), ConfigurationError> {
        if self.table.is_empty() {
            return Err(ConfigurationError::NoStrategies);
        }
        Ok(())
    }

    fn walk<Req, Res>(&self, session: &mut RoutingSession<Req, Res>) {
        while let Some(strategy) = self.table.get(session.current_strategy_index) {
            match self.health.skip_reason(strategy) {
                None => {
                    tracing::debug!(
                        request_id = %session.request_id,
                        strategy = %strategy.id,
                        index = session.current_strategy_index,
                        attempt = session.attempt_count,
                        "Selected strategy"
                    );
                    session.phase = RoutingPhase::Executing;
                    return;
                }
                Some(reason) => {
                    tracing::debug!(
                        request_id = %session.request_id,
                        strategy = %strategy.id,
                        reason = %reason,
                        "Skipping strategy"
                    );
                    session.skipped.push(SkippedStrategy {
                        strategy_id: strategy.id.clone(),
                        reason,
                    });
                    session.current_strategy_index += 1;
                }
            }
        }

        session.current_strategy_index = self.table.len();
        session.success = false;
        session.error = Some(SessionError::NoAvailableStrategies);
        session.phase = RoutingPhase::Exhausted;
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("logical_name", &self.table.logical_name())
            .field("strategies", &self.table.ids())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
