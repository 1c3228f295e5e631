//! roamline-server: trip planning backend isolated by Postgres row security
//!
//! Every request gets at most one pooled connection, one transaction and one
//! security context, bound lazily on first use and released exactly once when
//! the request ends. A diagnostic harness verifies the row-security policies
//! those contexts feed.

pub mod config;
pub mod db;
pub mod http;
pub mod models;
pub mod rls;
pub mod session;

pub use config::{ConfigError, ServerConfig};
pub use http::{build_router, run_server, ApiError, AppState, ServerError};
pub use rls::{AggregateReport, HarnessConfig, PolicyHarness};
pub use session::{Identity, RequestSession, SessionError, SessionManager};
