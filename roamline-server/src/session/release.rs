//! Release guarantee - finalize every request's session exactly once
//!
//! The middleware owns the request's [`RequestSession`] for the whole request.
//! Normal completion (any status) runs `finalize`; if the request future is
//! dropped first (client went away, timeout, handler panic) the guard's `Drop`
//! schedules `abort` instead.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::connection::ConnectionSource;
use super::manager::{Finalization, RequestSession, SessionManager};

/// Scoped owner of a request session.
pub struct ReleaseGuard<P: ConnectionSource> {
    session: Option<Arc<RequestSession<P>>>,
}

impl<P: ConnectionSource> ReleaseGuard<P> {
    pub fn new(session: Arc<RequestSession<P>>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Finalize now. Consumes the guard so `Drop` has nothing left to do.
    pub async fn finalize(mut self) -> Finalization {
        match self.session.take() {
            Some(session) => session.finalize().await,
            None => Finalization::AlreadyReleased,
        }
    }
}

impl<P: ConnectionSource> Drop for ReleaseGuard<P> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("request abandoned before its session was finalized; rolling back");
                handle.spawn(async move {
                    session.abort().await;
                });
            }
            Err(_) => {
                // RequestSession's own Drop closes the connection
                tracing::error!("request abandoned outside a runtime");
            }
        }
    }
}

/// Middleware: create the request session, run the handler, finalize.
///
/// Handlers reach the session through the `RequestDb` extractor, which reads the
/// `Arc<RequestSession<P>>` inserted here.
pub async fn release_guarantee<P: ConnectionSource>(
    State(manager): State<SessionManager<P>>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = manager.request_session();
    request.extensions_mut().insert(session.clone());

    let guard = ReleaseGuard::new(session);
    let response = next.run(request).await;

    let outcome = guard.finalize().await;
    if outcome == Finalization::Discarded {
        tracing::error!(status = %response.status(), "request finished but its connection had to be closed");
    }
    response
}
