//! Destination endpoints

use axum::{http::StatusCode, routing::get, Json, Router};

use crate::db::repos::{Destination, DestinationRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{RequestDb, RequireIdentity, ValidId};
use crate::http::state::AppState;
use crate::models::{CreateDestinationRequest, NewDestination};

/// GET /trips/{id}/destinations
async fn list_destinations(
    db: RequestDb,
    ValidId(trip_id): ValidId,
) -> Result<Json<Vec<Destination>>, ApiError> {
    let mut conn = db.acquire().await?;
    let destinations = DestinationRepo::new(&mut conn).list_by_trip(trip_id).await?;
    Ok(Json(destinations))
}

/// POST /trips/{id}/destinations
async fn create_destination(
    _caller: RequireIdentity,
    db: RequestDb,
    ValidId(trip_id): ValidId,
    Json(req): Json<CreateDestinationRequest>,
) -> Result<(StatusCode, Json<Destination>), ApiError> {
    let destination = NewDestination::try_from(req)?;

    let mut conn = db.acquire().await?;
    let created = DestinationRepo::new(&mut conn)
        .create(trip_id, &destination)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Destination routes
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/trips/{id}/destinations",
        get(list_destinations).post(create_destination),
    )
}
