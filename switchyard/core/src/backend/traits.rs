//! Backend Trait
//!
//! The routing core never performs a call itself. A [`Backend`] receives the
//! request, the selected strategy's [`BackendRef`] and a cancellation token,
//! and reports either a response or a classified [`BackendError`].
//!
//! Implementations own everything about transport (HTTP, gRPC, an SDK) and
//! response parsing. The only contract the core relies on is the
//! [`ErrorKind`](crate::routing::ErrorKind) carried by failures, which is
//! matched against retry rules.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::routing::{BackendError, BackendRef};

/// A callable backend shared by every strategy in a table
///
/// One backend serves all strategies; `backend_ref.target` tells it which
/// model or endpoint a given strategy points at.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Request payload, passed through untouched
    type Request: Send + Sync;

    /// Response payload, passed through untouched
    type Response: Send;

    /// Backend name for logging
    fn name(&self) -> &str;

    /// Perform one call
    ///
    /// Implementations should return promptly once `cancel` fires. The
    /// executor also races the call against the token, so a backend that
    /// ignores it is still abandoned with
    /// [`ErrorKind::Cancelled`](crate::routing::ErrorKind::Cancelled).
    async fn invoke(
        &self,
        request: &Self::Request,
        backend_ref: &BackendRef,
        cancel: CancellationToken,
    ) -> Result<Self::Response, BackendError>;
}
