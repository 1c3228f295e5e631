//! Request-scoped session manager
//!
//! One [`RequestSession`] per inbound request. The first `acquire` borrows a
//! connection, runs `BEGIN` and applies the caller's security context; later calls
//! in the same request get the same connection back. `finalize` ends the
//! transaction, blanks the context keys and returns the connection, exactly once.
//!
//! State machine: `Unbound -> Active -> Released`, or `Unbound -> Released` when
//! setup fails or the request ends without touching the database.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use super::connection::{ConnectionSource, SessionConnection};
use super::identity::{Identity, SecurityContext, CONTEXT_KEYS};

/// Default time to wait for a pooled connection
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced to request handlers by [`RequestSession::acquire`]
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no database connection available within {}ms", timeout.as_millis())]
    PoolExhausted { timeout: Duration },

    #[error("could not acquire database connection: {0}")]
    Acquire(#[source] sqlx::Error),

    #[error("failed to begin transaction: {0}")]
    BeginFailed(#[source] sqlx::Error),

    #[error("failed to apply security context: {0}")]
    ContextApplicationFailed(#[source] sqlx::Error),

    #[error("session already released for this request")]
    Released,
}

impl SessionError {
    /// Whether the caller may retry the request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }
}

/// Failures while finalizing. Logged, never returned to callers.
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("rollback failed: {0}")]
    Rollback(#[source] sqlx::Error),

    #[error("clearing security context failed: {0}")]
    Clear(#[source] sqlx::Error),
}

/// How a transaction should end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Commit,
    Rollback,
}

/// What `finalize`/`abort` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// The request never touched the database
    NotBound,
    /// An earlier call already released the session
    AlreadyReleased,
    /// Committed, context cleared, connection returned
    Committed,
    /// Rolled back (requested, after a failed commit, or because a statement had
    /// already aborted the transaction), connection returned
    RolledBack,
    /// The connection could not be brought back to a clean state and was closed
    Discarded,
}

/// A connection inside an open transaction with a security context applied.
pub(crate) struct BoundConnection<C> {
    conn: C,
    context: SecurityContext,
}

impl<C: SessionConnection> BoundConnection<C> {
    /// Borrow, begin, apply context, in that order. Nothing is handed out before
    /// every context statement has been acknowledged.
    pub(crate) async fn open<P>(
        pool: &P,
        timeout: Duration,
        context: SecurityContext,
    ) -> Result<Self, SessionError>
    where
        P: ConnectionSource<Connection = C>,
    {
        let mut conn = match tokio::time::timeout(timeout, pool.acquire()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(sqlx::Error::PoolTimedOut)) | Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "connection pool exhausted");
                return Err(SessionError::PoolExhausted { timeout });
            }
            Ok(Err(e)) => return Err(SessionError::Acquire(e)),
        };

        if let Err(e) = conn.begin().await {
            conn.discard().await;
            return Err(SessionError::BeginFailed(e));
        }

        let mut failed = None;
        for (key, value) in context.settings() {
            if let Err(e) = conn.set_local(key, value).await {
                failed = Some(e);
                break;
            }
        }

        if let Some(e) = failed {
            tracing::error!(error = %e, "security context could not be applied; rolling back");
            match conn.rollback().await {
                Ok(()) => drop(conn),
                Err(rollback) => {
                    tracing::error!(error = %FinalizeError::Rollback(rollback), "discarding connection");
                    conn.discard().await;
                }
            }
            return Err(SessionError::ContextApplicationFailed(e));
        }

        Ok(Self { conn, context })
    }

    pub(crate) fn context(&self) -> &SecurityContext {
        &self.context
    }

    pub(crate) fn conn(&mut self) -> &mut C {
        &mut self.conn
    }

    /// End the transaction, blank the context keys, return or close the connection.
    pub(crate) async fn close(mut self, disposition: Disposition) -> Finalization {
        let mut outcome = match disposition {
            Disposition::Commit => match self.conn.transaction_aborted().await {
                Ok(false) => match self.conn.commit().await {
                    Ok(()) => Finalization::Committed,
                    Err(e) => {
                        tracing::error!(error = %FinalizeError::Commit(e), "falling back to rollback");
                        self.rollback_or_discard().await
                    }
                },
                Ok(true) => {
                    tracing::warn!("transaction aborted by a failed statement; rolling back");
                    self.rollback_or_discard().await
                }
                Err(e) => {
                    tracing::error!(error = %FinalizeError::Commit(e), "falling back to rollback");
                    self.rollback_or_discard().await
                }
            },
            Disposition::Rollback => self.rollback_or_discard().await,
        };

        if outcome != Finalization::Discarded {
            if let Err(e) = self.conn.clear(&CONTEXT_KEYS).await {
                tracing::error!(error = %FinalizeError::Clear(e), "discarding connection");
                outcome = Finalization::Discarded;
            }
        }

        if outcome == Finalization::Discarded {
            self.conn.discard().await;
        }
        outcome
    }

    async fn rollback_or_discard(&mut self) -> Finalization {
        match self.conn.rollback().await {
            Ok(()) => Finalization::RolledBack,
            Err(e) => {
                tracing::error!(error = %FinalizeError::Rollback(e), "discarding connection");
                Finalization::Discarded
            }
        }
    }
}

enum SessionState<C> {
    Unbound,
    Active(BoundConnection<C>),
    Released,
}

/// Hands out one [`RequestSession`] per request.
pub struct SessionManager<P> {
    pool: Arc<P>,
    acquire_timeout: Duration,
}

impl<P> Clone for SessionManager<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            acquire_timeout: self.acquire_timeout,
        }
    }
}

impl<P: ConnectionSource> SessionManager<P> {
    pub fn new(pool: P, acquire_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            acquire_timeout,
        }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub(crate) fn shared_pool(&self) -> Arc<P> {
        self.pool.clone()
    }

    /// Fresh, unbound session for one request.
    pub fn request_session(&self) -> Arc<RequestSession<P>> {
        Arc::new(RequestSession {
            pool: self.pool.clone(),
            acquire_timeout: self.acquire_timeout,
            state: Mutex::new(SessionState::Unbound),
        })
    }
}

/// The memoized session of a single request.
pub struct RequestSession<P: ConnectionSource> {
    pool: Arc<P>,
    acquire_timeout: Duration,
    state: Mutex<SessionState<P::Connection>>,
}

impl<P: ConnectionSource> RequestSession<P> {
    /// Bind on first call, reuse afterwards. The identity of a later call is
    /// ignored: the first caller decides the security context.
    pub async fn acquire(
        &self,
        identity: Option<&Identity>,
    ) -> Result<SessionHandle<'_, P::Connection>, SessionError> {
        let mut state = self.state.lock().await;

        match &*state {
            SessionState::Released => return Err(SessionError::Released),
            SessionState::Active(bound) => {
                if bound.context().principal() != identity.map(Identity::principal) {
                    tracing::debug!("session already bound; ignoring identity of later acquire");
                }
            }
            SessionState::Unbound => {
                let context = SecurityContext::for_identity(identity);
                match BoundConnection::open(&*self.pool, self.acquire_timeout, context).await {
                    Ok(bound) => {
                        tracing::debug!(
                            principal = bound.context().principal().unwrap_or("<anonymous>"),
                            "session bound"
                        );
                        *state = SessionState::Active(bound);
                    }
                    Err(e) => {
                        *state = SessionState::Released;
                        return Err(e);
                    }
                }
            }
        }

        MutexGuard::try_map(state, |s| match s {
            SessionState::Active(bound) => Some(bound.conn()),
            _ => None,
        })
        .map(|guard| SessionHandle { guard })
        .map_err(|_| SessionError::Released)
    }

    /// Commit (rollback on failure), clear, return. Safe to call repeatedly.
    pub async fn finalize(&self) -> Finalization {
        self.release(Disposition::Commit).await
    }

    /// Like [`finalize`](Self::finalize) but always rolls back.
    pub async fn abort(&self) -> Finalization {
        self.release(Disposition::Rollback).await
    }

    pub async fn is_bound(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Active(_))
    }

    async fn release(&self, disposition: Disposition) -> Finalization {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, SessionState::Released)
        };

        let outcome = match previous {
            SessionState::Unbound => Finalization::NotBound,
            SessionState::Released => Finalization::AlreadyReleased,
            SessionState::Active(bound) => bound.close(disposition).await,
        };

        if outcome == Finalization::Discarded {
            tracing::warn!(?disposition, "session finalized with errors; connection closed");
        } else {
            tracing::debug!(?disposition, ?outcome, "session released");
        }
        outcome
    }
}

impl<P: ConnectionSource> Drop for RequestSession<P> {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), SessionState::Released);
        let SessionState::Active(bound) = state else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("session dropped while active; rolling back");
                handle.spawn(async move {
                    bound.close(Disposition::Rollback).await;
                });
            }
            Err(_) => {
                // No runtime to roll back on. Dropping hands the connection back to
                // the pool with its transaction still open.
                tracing::error!("session dropped while active outside a runtime; transaction not rolled back");
                drop(bound);
            }
        }
    }
}

/// Exclusive access to the request's connection. Derefs to the connection type,
/// so for Postgres `&mut *handle` is usable wherever sqlx wants an executor.
pub struct SessionHandle<'a, C> {
    guard: MappedMutexGuard<'a, C>,
}

impl<C> Deref for SessionHandle<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.guard
    }
}

impl<C> DerefMut for SessionHandle<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::identity::{CLAIMS_SETTING, USER_ID_SETTING};
    use crate::session::testing::{Faults, MockPool, Op};

    fn manager(pool: &MockPool) -> SessionManager<MockPool> {
        SessionManager::new(pool.clone(), Duration::from_millis(50))
    }

    fn user(id: &str) -> Identity {
        Identity::new(id).unwrap()
    }

    #[tokio::test]
    async fn acquire_begins_and_applies_context_before_any_query() {
        let pool = MockPool::new(1);
        let session = manager(&pool).request_session();

        let mut conn = session.acquire(Some(&user("user-A"))).await.unwrap();
        conn.query("SELECT * FROM trip").await.unwrap();
        drop(conn);

        let ops = pool.ops();
        let set = ops
            .iter()
            .position(|op| matches!(op, Op::Set(k, v) if k == USER_ID_SETTING && v == "user-A"))
            .expect("context applied");
        let begin = ops.iter().position(|op| *op == Op::Begin).unwrap();
        let query = ops.iter().position(|op| matches!(op, Op::Query(_))).unwrap();
        assert!(begin < set && set < query, "ordering violated: {ops:?}");
    }

    #[tokio::test]
    async fn acquire_is_memoized_and_first_identity_wins() {
        let pool = MockPool::new(2);
        let session = manager(&pool).request_session();

        let first = session.acquire(Some(&user("user-A"))).await.unwrap().id();
        let second = session.acquire(Some(&user("user-B"))).await.unwrap();

        assert_eq!(second.id(), first);
        assert_eq!(second.setting(USER_ID_SETTING).as_deref(), Some("user-A"));
        drop(second);

        let acquired = pool.ops().iter().filter(|op| **op == Op::Acquired).count();
        assert_eq!(acquired, 1);
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn anonymous_session_blanks_every_key() {
        let pool = MockPool::new(1);
        pool.seed_leftover(USER_ID_SETTING, "stale-user").await;
        let session = manager(&pool).request_session();

        let conn = session.acquire(None).await.unwrap();
        assert_eq!(conn.setting(USER_ID_SETTING).as_deref(), Some(""));
        assert_eq!(conn.setting(CLAIMS_SETTING).as_deref(), Some(""));
    }

    #[tokio::test]
    async fn finalize_takes_effect_exactly_once() {
        let pool = MockPool::new(1);
        let session = manager(&pool).request_session();
        session.acquire(None).await.unwrap();

        assert_eq!(session.finalize().await, Finalization::Committed);
        assert_eq!(session.finalize().await, Finalization::AlreadyReleased);
        assert_eq!(session.abort().await, Finalization::AlreadyReleased);

        let ops = pool.ops();
        assert_eq!(ops.iter().filter(|op| **op == Op::Commit).count(), 1);
        assert_eq!(ops.iter().filter(|op| **op == Op::Returned).count(), 1);
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn finalize_without_acquire_is_a_noop() {
        let pool = MockPool::new(1);
        let session = manager(&pool).request_session();

        assert_eq!(session.finalize().await, Finalization::NotBound);
        assert!(pool.ops().is_empty());
    }

    #[tokio::test]
    async fn released_session_cannot_be_reused() {
        let pool = MockPool::new(1);
        let session = manager(&pool).request_session();
        session.acquire(None).await.unwrap();
        session.finalize().await;

        let err = session.acquire(None).await.err().unwrap();
        assert!(matches!(err, SessionError::Released));
    }

    #[tokio::test]
    async fn finalize_clears_context_before_returning_connection() {
        let pool = MockPool::new(1);
        let session = manager(&pool).request_session();
        session.acquire(Some(&user("user-A"))).await.unwrap();
        session.finalize().await;

        let ops = pool.ops();
        let n = ops.len();
        assert_eq!(&ops[n - 3..], &[Op::Commit, Op::Clear, Op::Returned]);
    }

    #[tokio::test]
    async fn reused_connection_never_leaks_previous_identity() {
        let pool = MockPool::new(1);
        let manager = manager(&pool);

        let first = manager.request_session();
        let conn_id = {
            let conn = first.acquire(Some(&user("user-A"))).await.unwrap();
            assert_eq!(conn.setting(USER_ID_SETTING).as_deref(), Some("user-A"));
            conn.id()
        };
        first.finalize().await;

        let second = manager.request_session();
        let conn = second.acquire(None).await.unwrap();
        assert_eq!(conn.id(), conn_id, "single-connection pool must reuse");
        assert_eq!(conn.setting(USER_ID_SETTING).as_deref(), Some(""));
        assert!(!conn.setting(CLAIMS_SETTING).unwrap_or_default().contains("user-A"));
        drop(conn);

        let third = manager.request_session();
        drop(second);
        let conn = third.acquire(Some(&user("user-B"))).await.unwrap();
        assert_eq!(conn.setting(USER_ID_SETTING).as_deref(), Some("user-B"));
    }

    #[tokio::test]
    async fn commit_failure_falls_back_to_rollback() {
        let pool = MockPool::new(1);
        let session = manager(&pool).request_session();
        session.acquire(None).await.unwrap();
        pool.set_faults(Faults {
            commit: true,
            ..Faults::default()
        });

        assert_eq!(session.finalize().await, Finalization::RolledBack);
        assert!(pool.ops().contains(&Op::Rollback));
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn unrecoverable_connection_is_discarded_not_returned() {
        let pool = MockPool::new(1);
        let session = manager(&pool).request_session();
        session.acquire(None).await.unwrap();
        pool.set_faults(Faults {
            commit: true,
            rollback: true,
            ..Faults::default()
        });

        assert_eq!(session.finalize().await, Finalization::Discarded);
        let ops = pool.ops();
        assert!(ops.contains(&Op::Discarded));
        assert!(!ops.contains(&Op::Returned));
        // Replacement connection keeps the pool at capacity
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn clear_failure_discards_connection() {
        let pool = MockPool::new(1);
        let session = manager(&pool).request_session();
        session.acquire(Some(&user("user-A"))).await.unwrap();
        pool.set_faults(Faults {
            clear: true,
            ..Faults::default()
        });

        assert_eq!(session.finalize().await, Finalization::Discarded);
        let ops = pool.ops();
        assert!(ops.contains(&Op::Commit));
        assert!(ops.contains(&Op::Discarded));
        assert!(!ops.contains(&Op::Returned));
        assert_eq!(pool.idle(), 1);

        // The replacement carries no identity from the discarded one
        pool.set_faults(Faults::default());
        let next = manager(&pool).request_session();
        let conn = next.acquire(None).await.unwrap();
        assert_eq!(conn.setting(USER_ID_SETTING).as_deref(), Some(""));
    }

    #[tokio::test]
    async fn aborted_transaction_is_rolled_back_not_reported_committed() {
        let pool = MockPool::new(1);
        pool.on_probe(|sql, _, _| {
            if sql.contains("1/0") {
                Err("division by zero".to_string())
            } else {
                Ok(vec![])
            }
        });
        let session = manager(&pool).request_session();
        {
            let mut conn = session.acquire(Some(&user("user-A"))).await.unwrap();
            conn.query("INSERT INTO trip (name) VALUES ('lost')").await.unwrap();
            assert!(conn.query("SELECT 1/0").await.is_err());
        }

        assert_eq!(session.finalize().await, Finalization::RolledBack);
        let ops = pool.ops();
        assert!(!ops.contains(&Op::Commit));
        assert!(ops.contains(&Op::Rollback));
        assert!(pool.committed().is_empty());
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn context_failure_rolls_back_and_returns_connection() {
        let pool = MockPool::new(1);
        pool.set_faults(Faults {
            set_local: true,
            ..Faults::default()
        });
        let session = manager(&pool).request_session();

        let err = session.acquire(Some(&user("user-A"))).await.err().unwrap();
        assert!(matches!(err, SessionError::ContextApplicationFailed(_)));
        assert_eq!(pool.ops().last(), Some(&Op::Returned));
        assert!(pool.ops().contains(&Op::Rollback));
        assert_eq!(pool.idle(), 1);

        // Setup failure releases the session
        assert!(!session.is_bound().await);
        assert_eq!(session.finalize().await, Finalization::AlreadyReleased);
    }

    #[tokio::test]
    async fn begin_failure_discards_connection() {
        let pool = MockPool::new(1);
        pool.set_faults(Faults {
            begin: true,
            ..Faults::default()
        });
        let session = manager(&pool).request_session();

        let err = session.acquire(None).await.err().unwrap();
        assert!(matches!(err, SessionError::BeginFailed(_)));
        assert!(pool.ops().contains(&Op::Discarded));
    }

    #[tokio::test]
    async fn saturated_pool_reports_exhaustion_without_binding() {
        let pool = MockPool::new(1);
        let manager = manager(&pool);

        let holder = manager.request_session();
        holder.acquire(Some(&user("user-A"))).await.unwrap();

        let waiter = manager.request_session();
        let err = waiter.acquire(Some(&user("user-B"))).await.err().unwrap();
        assert!(matches!(err, SessionError::PoolExhausted { .. }));
        assert!(err.is_retryable());
        assert!(!waiter.is_bound().await);

        holder.finalize().await;
        assert_eq!(pool.idle(), 1);
        let acquired = pool.ops().iter().filter(|op| **op == Op::Acquired).count();
        assert_eq!(acquired, 1);
    }

    #[tokio::test]
    async fn dropped_active_session_is_rolled_back() {
        let pool = MockPool::new(1);
        let session = manager(&pool).request_session();
        session.acquire(Some(&user("user-A"))).await.unwrap();
        drop(session);

        // Rollback runs on a spawned task
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let ops = pool.ops();
        assert!(ops.contains(&Op::Rollback), "{ops:?}");
        assert!(!ops.contains(&Op::Commit));
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn dropped_outside_runtime_returns_connection_unrolled() {
        let pool = MockPool::new(1);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let session = rt.block_on(async {
            let session = manager(&pool).request_session();
            session.acquire(None).await.unwrap();
            session
        });
        drop(rt);

        drop(session);
        let ops = pool.ops();
        assert!(!ops.contains(&Op::Rollback));
        assert_eq!(ops.last(), Some(&Op::Returned));
        assert_eq!(pool.idle(), 1);
    }
}
