//! HTTP server layer
//!
//! Axum server with:
//! - Per-request database session, finalized by the release guarantee layer
//! - Identity from trusted gateway headers
//! - CORS (localhost only by default)
//! - Request tracing
//! - Graceful shutdown
//! - JSON error responses

pub mod error;
pub mod extractors;
pub mod identity;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use extractors::{RequestDb, RequireIdentity};
pub use identity::{IdentityResolver, TrustedHeaderResolver};
pub use server::{build_router, run_server, ServerError};
pub use state::AppState;
