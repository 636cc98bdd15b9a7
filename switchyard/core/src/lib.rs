//! Switchyard Core - Resilient Request Routing
//!
//! Routes a logical request (an LLM completion, an embedding call, anything
//! with interchangeable backends) across a priority-ordered table of
//! strategies. Transient failures are retried in place, failed strategies
//! fall back to the next eligible one, and a shared circuit breaker keeps
//! persistently failing strategies out of rotation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Callers                              │
//! │   simulator CLI  ·  services  ·  pipeline schedulers         │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ route(request)
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                      SWITCHYARD CORE                         │
//! │  ┌────────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐  │
//! │  │ Strategy   │  │  Router  │  │ Executor │  │  Health    │  │
//! │  │ Table      │  │          │  │          │  │  Registry  │  │
//! │  └────────────┘  └──────────┘  └────┬─────┘  └────────────┘  │
//! └─────────────────────────────────────┼────────────────────────┘
//!                                       │ invoke(request, backend_ref, cancel)
//!                                 ┌─────┴─────┐
//!                                 │  Backend  │
//!                                 └───────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use switchyard_core::{
//!     backend::ScriptedBackend, InMemoryHealthRegistry, RetryRule, RoutingEngine, Strategy,
//!     StrategyTable,
//! };
//!
//! let table = StrategyTable::new("chat", vec![
//!     Strategy::new("primary", 300).with_retry_rule(RetryRule::new(3)),
//!     Strategy::new("fallback", 200),
//! ])?;
//! let engine = RoutingEngine::new(
//!     table,
//!     Arc::new(ScriptedBackend::new()),
//!     Arc::new(InMemoryHealthRegistry::new()),
//! );
//! let routed = engine.route("hello".to_string()).await?;
//! println!("{} answered via {}", routed.logical_name, routed.served_by);
//! ```
//!
//! # Module Overview
//!
//! - [`routing`]: strategy table, router, executor, health registry, engine
//! - [`backend`]: the [`Backend`](backend::Backend) trait and a scripted implementation
//! - [`config`]: TOML / environment loading of strategy tables

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod routing;

// Routing exports
pub use routing::{
    BackendError, BackendRef, Backoff, ConfigurationError, ErrorKind, HealthRecord,
    HealthRegistry, InMemoryHealthRegistry, RetryPolicy, RetryRule, Routed, RoutingEngine,
    RoutingError, RoutingMetrics, RoutingObserver, RoutingReport, RoutingSession, Strategy,
    StrategyTable,
};

// Backend exports
pub use backend::{Backend, ScriptedBackend, ScriptedOutcome, ScriptedReply};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, RoutesConfig, RoutesToml,
};

// Accepted by `RoutingEngine::route_with_cancel`
pub use tokio_util::sync::CancellationToken;
