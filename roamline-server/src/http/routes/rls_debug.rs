//! Row-security debug endpoints
//!
//! Mounted only when `debug_routes` is enabled. Each endpoint runs harness
//! probes in their own rolled-back transactions; the request session is never
//! touched.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::http::error::ApiError;
use crate::http::state::AppState;
use crate::rls::{AggregateReport, CheckResult};
use crate::session::{ConnectionSource, Identity};

#[derive(Debug, Deserialize)]
pub struct RunAllParams {
    pub owner_id: Option<String>,
}

fn owner(owner_id: &str) -> Result<Identity, ApiError> {
    Ok(Identity::new(owner_id)?)
}

/// GET /debug/rls/policy-exists
async fn policy_exists<P: ConnectionSource>(State(state): State<AppState<P>>) -> Json<CheckResult> {
    Json(state.harness.check_policy_exists().await)
}

/// GET /debug/rls/rls-enabled
async fn rls_enabled<P: ConnectionSource>(State(state): State<AppState<P>>) -> Json<CheckResult> {
    Json(state.harness.check_rls_enabled().await)
}

/// GET /debug/rls/test-unauthenticated
async fn test_unauthenticated<P: ConnectionSource>(
    State(state): State<AppState<P>>,
) -> Json<CheckResult> {
    Json(state.harness.check_anonymous_access().await)
}

/// GET /debug/rls/test-stranger/{owner_id}
async fn test_stranger<P: ConnectionSource>(
    State(state): State<AppState<P>>,
    Path(owner_id): Path<String>,
) -> Result<Json<CheckResult>, ApiError> {
    let owner = owner(&owner_id)?;
    Ok(Json(state.harness.check_stranger_access(&owner).await))
}

/// GET /debug/rls/test-owner/{owner_id}
async fn test_owner<P: ConnectionSource>(
    State(state): State<AppState<P>>,
    Path(owner_id): Path<String>,
) -> Result<Json<CheckResult>, ApiError> {
    let owner = owner(&owner_id)?;
    Ok(Json(state.harness.check_owner_access(&owner).await))
}

/// GET /debug/rls/run-all?owner_id=
async fn run_all<P: ConnectionSource>(
    State(state): State<AppState<P>>,
    Query(params): Query<RunAllParams>,
) -> Result<Json<AggregateReport>, ApiError> {
    let owner = params.owner_id.as_deref().map(owner).transpose()?;
    Ok(Json(state.harness.run_all(owner.as_ref()).await))
}

/// Debug routes
pub fn router<P: ConnectionSource>() -> Router<AppState<P>> {
    Router::new()
        .route("/debug/rls/policy-exists", get(policy_exists::<P>))
        .route("/debug/rls/rls-enabled", get(rls_enabled::<P>))
        .route("/debug/rls/test-unauthenticated", get(test_unauthenticated::<P>))
        .route("/debug/rls/test-stranger/{owner_id}", get(test_stranger::<P>))
        .route("/debug/rls/test-owner/{owner_id}", get(test_owner::<P>))
        .route("/debug/rls/run-all", get(run_all::<P>))
}
