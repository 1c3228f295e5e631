//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use super::identity::IdentityResolver;
use crate::rls::PolicyHarness;
use crate::session::{ConnectionSource, SessionManager};

/// Everything handlers share. Generic over the pool so routes that do not
/// need Postgres-specific repositories can run against any connection source.
pub struct AppState<P = PgPool> {
    pub sessions: SessionManager<P>,
    pub harness: PolicyHarness<P>,
    pub resolver: Arc<dyn IdentityResolver>,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            harness: self.harness.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<P: ConnectionSource> AppState<P> {
    pub fn new(
        sessions: SessionManager<P>,
        harness: PolicyHarness<P>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            sessions,
            harness,
            resolver,
        }
    }
}
