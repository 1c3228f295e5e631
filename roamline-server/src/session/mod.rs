//! Request-scoped database sessions with security-context propagation
//!
//! - One connection, one transaction, one security context per request
//! - Context statements acknowledged before the connection is handed out
//! - Finalized exactly once by the release guarantee middleware

pub mod connection;
pub mod identity;
pub mod manager;
pub mod release;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ConnectionSource, SessionConnection};
pub use identity::{Identity, SecurityContext, CLAIMS_SETTING, CONTEXT_KEYS, USER_ID_SETTING};
pub use manager::{
    Disposition, Finalization, FinalizeError, RequestSession, SessionError, SessionHandle,
    SessionManager, DEFAULT_ACQUIRE_TIMEOUT,
};
pub use release::{release_guarantee, ReleaseGuard};
