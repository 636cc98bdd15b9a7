//! Resilient Request Routing
//!
//! Dispatches one logical request to a ranked list of backend strategies,
//! retrying transient failures in place and falling back to lower-priority
//! strategies when one is declared failed.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  RoutingEngine   |  <-- Entry point: route(request)
//! +--------+---------+
//!          |
//!    +-----+------+
//!    |            |
//!    v            v
//! +--------+  +----------+
//! | Router |  | Executor |  <-- select / invoke + retry in place
//! +---+----+  +----+-----+
//!     |            |
//!     v            v
//! +------------------+     +---------+
//! |  HealthRegistry  |     | Backend |  <-- shared breaker state / caller's transport
//! +------------------+     +---------+
//! ```
//!
//! # Design Principles
//!
//! 1. **Explicit state**: every step reads and writes a plain [`RoutingSession`]
//! 2. **Injectable health**: the registry is passed in, never global
//! 3. **Separate counters**: strategy hops and backend calls are counted apart
//! 4. **No auto re-enable**: a disabled strategy stays disabled until reset

pub mod clock;
pub mod engine;
pub mod error;
pub mod executor;
pub mod health;
pub mod metrics;
pub mod router;
pub mod session;
pub mod strategy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Routed, RoutingEngine, RoutingObserver, RoutingReport};
pub use error::{
    BackendError, ConfigurationError, ErrorKind, RoutingError, SkipReason, SkippedStrategy,
    StrategyFailure, UnknownErrorKind,
};
pub use executor::Executor;
pub use health::{HealthRecord, HealthRegistry, InMemoryHealthRegistry};
pub use metrics::{MetricsSnapshot, RoutingMetrics, StrategyStats};
pub use router::Router;
pub use session::{RoutingPhase, RoutingSession, SessionError};
pub use strategy::{Backoff, BackendRef, RetryPolicy, RetryRule, Strategy, StrategyTable};
