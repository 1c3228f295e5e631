//! Trip endpoints
//!
//! Reads are open to anonymous callers (public trips only, per row security);
//! writes require an identity.

use axum::{
    extract::Query,
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::db::repos::{Trip, TripRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{RequestDb, RequireIdentity, ValidId};
use crate::http::state::AppState;
use crate::models::{
    CreateTripRequest, NewTrip, Paginated, Pagination, PaginationParams, TripPatch,
    UpdateTripRequest, ValidationError,
};

/// GET /trips - trips visible to the caller
async fn list_trips(
    db: RequestDb,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Trip>>, ApiError> {
    let mut conn = db.acquire().await?;
    let trips = TripRepo::new(&mut conn).list(Pagination::from(params)).await?;
    Ok(Json(trips))
}

/// POST /trips - create a trip owned by the caller
async fn create_trip(
    RequireIdentity(identity): RequireIdentity,
    db: RequestDb,
    Json(req): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<Trip>), ApiError> {
    let trip = NewTrip::try_from(req)?;

    let mut conn = db.acquire().await?;
    let created = TripRepo::new(&mut conn).create(&trip).await?;
    tracing::info!(trip_id = created.id, principal = identity.principal(), "trip created");

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /trips/{id}
async fn get_trip(db: RequestDb, ValidId(id): ValidId) -> Result<Json<Trip>, ApiError> {
    let mut conn = db.acquire().await?;
    let trip = TripRepo::new(&mut conn).get(id).await?;
    Ok(Json(trip))
}

/// PATCH /trips/{id} - rename, describe, favorite or publish
async fn update_trip(
    _caller: RequireIdentity,
    db: RequestDb,
    ValidId(id): ValidId,
    Json(req): Json<UpdateTripRequest>,
) -> Result<Json<Trip>, ApiError> {
    let patch = TripPatch::try_from(req)?;
    if patch.is_empty() {
        return Err(ValidationError::Empty { field: "update" }.into());
    }

    let mut conn = db.acquire().await?;
    let trip = TripRepo::new(&mut conn).update(id, &patch).await?;
    Ok(Json(trip))
}

/// DELETE /trips/{id}
async fn delete_trip(
    _caller: RequireIdentity,
    db: RequestDb,
    ValidId(id): ValidId,
) -> Result<StatusCode, ApiError> {
    let mut conn = db.acquire().await?;
    TripRepo::new(&mut conn).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Trip routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route(
            "/trips/{id}",
            get(get_trip).patch(update_trip).delete(delete_trip),
        )
}
