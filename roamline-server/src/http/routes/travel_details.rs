//! Travel detail endpoints

use axum::{
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use crate::db::repos::{TravelDetail, TravelDetailRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{RequestDb, RequireIdentity, ValidId, ValidUuid};
use crate::http::state::AppState;
use crate::models::{CreateTravelDetailRequest, NewTravelDetail};

/// GET /trips/{id}/details
async fn list_details(
    db: RequestDb,
    ValidId(trip_id): ValidId,
) -> Result<Json<Vec<TravelDetail>>, ApiError> {
    let mut conn = db.acquire().await?;
    let details = TravelDetailRepo::new(&mut conn).list_by_trip(trip_id).await?;
    Ok(Json(details))
}

/// POST /trips/{id}/details
async fn create_detail(
    _caller: RequireIdentity,
    db: RequestDb,
    ValidId(trip_id): ValidId,
    Json(req): Json<CreateTravelDetailRequest>,
) -> Result<(StatusCode, Json<TravelDetail>), ApiError> {
    let detail = NewTravelDetail::try_from(req)?;

    let mut conn = db.acquire().await?;
    let created = TravelDetailRepo::new(&mut conn).create(trip_id, &detail).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// DELETE /details/{id} - soft delete
async fn delete_detail(
    _caller: RequireIdentity,
    db: RequestDb,
    ValidUuid(id): ValidUuid,
) -> Result<StatusCode, ApiError> {
    let mut conn = db.acquire().await?;
    TravelDetailRepo::new(&mut conn).soft_delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Travel detail routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips/{id}/details", get(list_details).post(create_detail))
        .route("/details/{id}", delete(delete_detail))
}
