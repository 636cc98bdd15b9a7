//! Backend Integration
//!
//! Backends are supplied by callers through the [`Backend`] trait. The crate
//! ships one implementation, [`ScriptedBackend`], which plays back scripted
//! outcomes per target and is used by the simulator and the test suite.
//!
//! # Usage
//!
//! ```ignore
//! use switchyard_core::backend::{ScriptedBackend, ScriptedOutcome};
//! use switchyard_core::routing::ErrorKind;
//!
//! let backend = ScriptedBackend::new();
//! backend.push("primary", ScriptedOutcome::Fail(ErrorKind::Unavailable));
//! backend.set_default("fallback", ScriptedOutcome::Respond("ok".into()));
//! ```

mod scripted;
mod traits;

pub use scripted::{
    RecordedCall, ScriptedBackend, ScriptedOutcome, ScriptedReply, DEFAULT_HISTORY_LIMIT,
};
pub use traits::Backend;
