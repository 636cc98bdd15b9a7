//! Scripted Backend
//!
//! In-process [`Backend`] that plays back outcomes queued per target. Used by
//! the simulator binary and by tests that need deterministic failures.
//!
//! Resolution order for a call against `target`:
//!
//! 1. target marked unavailable: fail with `Unavailable`
//! 2. next queued outcome for the target
//! 3. the target's default outcome
//! 4. echo the request back
//!
//! Call counts are exact for the backend's lifetime; the detailed call
//! history keeps only the most recent [`DEFAULT_HISTORY_LIMIT`] calls unless
//! changed with [`ScriptedBackend::with_history_limit`].
//!
//! # Usage
//!
//! ```ignore
//! let backend = ScriptedBackend::new();
//! backend.script("primary", [ScriptedOutcome::Fail(ErrorKind::Internal)]);
//!
//! // After the test, verify which targets were called
//! assert_eq!(backend.call_count("primary"), 1);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::traits::Backend;
use crate::routing::{BackendError, BackendRef, ErrorKind};

/// Recorded calls kept by default
pub const DEFAULT_HISTORY_LIMIT: usize = 1_024;

// ============================================================================
// Outcomes
// ============================================================================

/// What a scripted call does
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Return this content
    Respond(String),
    /// Fail with this kind
    Fail(ErrorKind),
    /// Never complete; resolves only when the call is cancelled
    Hang,
}

/// Response produced by a [`ScriptedBackend`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScriptedReply {
    /// Target that answered
    pub target: String,
    /// Reply content
    pub content: String,
}

/// Captured call for test verification
#[derive(Clone, Debug)]
pub struct RecordedCall {
    /// Target the call was made against
    pub target: String,
    /// Request payload
    pub request: String,
    /// When the call started
    pub timestamp: Instant,
}

// ============================================================================
// Scripted Backend
// ============================================================================

#[derive(Debug)]
struct ScriptState {
    queues: HashMap<String, VecDeque<ScriptedOutcome>>,
    defaults: HashMap<String, ScriptedOutcome>,
    unavailable: HashSet<String>,
    history: VecDeque<RecordedCall>,
    history_limit: usize,
    call_counts: HashMap<String, usize>,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            queues: HashMap::new(),
            defaults: HashMap::new(),
            unavailable: HashSet::new(),
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            call_counts: HashMap::new(),
        }
    }
}

impl ScriptState {
    fn record(&mut self, target: &str, request: &str) {
        *self.call_counts.entry(target.to_string()).or_default() += 1;

        if self.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(RecordedCall {
            target: target.to_string(),
            request: request.to_string(),
            timestamp: Instant::now(),
        });
    }
}

/// Backend driven by per-target scripts
///
/// Cloning shares the script and the call history.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    name: String,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    /// Backend where every target echoes the request
    #[must_use]
    pub fn new() -> Self {
        Self::named("scripted")
    }

    /// Backend with a custom name for logging
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    /// Keep at most `limit` recorded calls; 0 disables the history
    ///
    /// Call counts are unaffected.
    #[must_use]
    pub fn with_history_limit(self, limit: usize) -> Self {
        {
            let mut state = self.state.lock();
            state.history_limit = limit;
            while state.history.len() > limit {
                state.history.pop_front();
            }
        }
        self
    }

    /// Queue one outcome for a target
    pub fn push(&self, target: impl Into<String>, outcome: ScriptedOutcome) {
        self.state
            .lock()
            .queues
            .entry(target.into())
            .or_default()
            .push_back(outcome);
    }

    /// Queue several outcomes for a target, in order
    pub fn script(
        &self,
        target: impl Into<String>,
        outcomes: impl IntoIterator<Item = ScriptedOutcome>,
    ) {
        self.state
            .lock()
            .queues
            .entry(target.into())
            .or_default()
            .extend(outcomes);
    }

    /// Outcome used once a target's queue is empty
    pub fn set_default(&self, target: impl Into<String>, outcome: ScriptedOutcome) {
        self.state.lock().defaults.insert(target.into(), outcome);
    }

    /// Make every call to a target fail with `Unavailable`
    pub fn set_unavailable(&self, target: impl Into<String>) {
        self.state.lock().unavailable.insert(target.into());
    }

    /// Undo [`set_unavailable`](Self::set_unavailable)
    pub fn set_available(&self, target: &str) {
        self.state.lock().unavailable.remove(target);
    }

    /// Recorded calls, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Calls made against one target
    #[must_use]
    pub fn call_count(&self, target: &str) -> usize {
        self.state
            .lock()
            .call_counts
            .get(target)
            .copied()
            .unwrap_or_default()
    }

    /// Calls made against all targets
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.state.lock().call_counts.values().sum()
    }

    /// Recorded targets in call order, repeats included
    #[must_use]
    pub fn targets_called(&self) -> Vec<String> {
        self.state
            .lock()
            .history
            .iter()
            .map(|call| call.target.clone())
            .collect()
    }

    /// Forget recorded calls and counts (scripts are kept)
    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.call_counts.clear();
    }

    fn next_outcome(&self, target: &str, request: &str) -> Option<ScriptedOutcome> {
        let mut state = self.state.lock();
        state.record(target, request);

        if state.unavailable.contains(target) {
            return Some(ScriptedOutcome::Fail(ErrorKind::Unavailable));
        }
        if let Some(outcome) = state.queues.get_mut(target).and_then(VecDeque::pop_front) {
            return Some(outcome);
        }
        state.defaults.get(target).cloned()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    type Request = String;
    type Response = ScriptedReply;

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        request: &String,
        backend_ref: &BackendRef,
        cancel: CancellationToken,
    ) -> Result<ScriptedReply, BackendError> {
        let target = backend_ref.target.as_str();
        let outcome = self.next_outcome(target, request);

        match outcome {
            None => Ok(ScriptedReply {
                target: target.to_string(),
                content: format!("{target}: {request}"),
            }),
            Some(ScriptedOutcome::Respond(content)) => Ok(ScriptedReply {
                target: target.to_string(),
                content,
            }),
            Some(ScriptedOutcome::Fail(kind)) => Err(BackendError::new(
                kind,
                format!("scripted {kind} from {target}"),
            )),
            Some(ScriptedOutcome::Hang) => {
                cancel.cancelled().await;
                Err(BackendError::cancelled())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(backend: &ScriptedBackend, target: &str) -> Result<ScriptedReply, BackendError> {
        tokio_test::block_on(backend.invoke(
            &"hello".to_string(),
            &BackendRef::new(target),
            CancellationToken::new(),
        ))
    }

    #[test]
    fn test_unscripted_target_echoes() {
        let backend = ScriptedBackend::new();
        let reply = call(&backend, "model-a").unwrap();

        assert_eq!(reply.target, "model-a");
        assert_eq!(reply.content, "model-a: hello");
        assert_eq!(backend.call_count("model-a"), 1);
    }

    #[test]
    fn test_queue_then_default() {
        let backend = ScriptedBackend::new();
        backend.script(
            "a",
            [
                ScriptedOutcome::Fail(ErrorKind::Unavailable),
                ScriptedOutcome::Respond("second".into()),
            ],
        );
        backend.set_default("a", ScriptedOutcome::Fail(ErrorKind::NotFound));

        assert_eq!(call(&backend, "a").unwrap_err().kind, ErrorKind::Unavailable);
        assert_eq!(call(&backend, "a").unwrap().content, "second");
        assert_eq!(call(&backend, "a").unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(call(&backend, "a").unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(backend.total_calls(), 4);
    }

    #[test]
    fn test_unavailable_overrides_script() {
        let backend = ScriptedBackend::new();
        backend.push("a", ScriptedOutcome::Respond("queued".into()));
        backend.set_unavailable("a");

        assert_eq!(call(&backend, "a").unwrap_err().kind, ErrorKind::Unavailable);

        backend.set_available("a");
        assert_eq!(call(&backend, "a").unwrap().content, "queued");
    }

    #[test]
    fn test_history_order() {
        let backend = ScriptedBackend::new();
        call(&backend, "a").unwrap();
        call(&backend, "b").unwrap();
        call(&backend, "a").unwrap();

        assert_eq!(backend.targets_called(), vec!["a", "b", "a"]);
        assert_eq!(backend.calls()[1].request, "hello");

        backend.clear_history();
        assert_eq!(backend.total_calls(), 0);
    }

    #[test]
    fn test_history_is_capped_but_counts_are_exact() {
        let backend = ScriptedBackend::new().with_history_limit(2);
        call(&backend, "a").unwrap();
        call(&backend, "b").unwrap();
        call(&backend, "c").unwrap();

        assert_eq!(backend.targets_called(), vec!["b", "c"]);
        assert_eq!(backend.total_calls(), 3);
        assert_eq!(backend.call_count("a"), 1);
    }

    #[test]
    fn test_history_disabled() {
        let backend = ScriptedBackend::new().with_history_limit(0);
        for _ in 0..5 {
            call(&backend, "a").unwrap();
        }

        assert!(backend.calls().is_empty());
        assert_eq!(backend.call_count("a"), 5);
    }

    #[test]
    fn test_hang_resolves_on_cancel() {
        let backend = ScriptedBackend::new();
        backend.push("slow", ScriptedOutcome::Hang);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = tokio_test::block_on(backend.invoke(
            &"hello".to_string(),
            &BackendRef::new("slow"),
            cancel,
        ));

        assert_eq!(result.unwrap_err().kind, ErrorKind::Cancelled);
    }
}
