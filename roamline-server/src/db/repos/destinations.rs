//! Destination repository

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgConnection};

use crate::db::DbError;
use crate::models::NewDestination;

const DESTINATION_COLUMNS: &str = "id, trip_id, name, description, latitude, longitude, \
     country, cover_image, gallery, is_favorite, user_id, created_at, updated_at";

/// Destination record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Destination {
    pub id: i32,
    pub trip_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub cover_image: Option<String>,
    pub gallery: Value,
    pub is_favorite: bool,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Destination repository
pub struct DestinationRepo<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> DestinationRepo<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }

    /// Destinations of a trip in creation order. A hidden trip yields no rows.
    pub async fn list_by_trip(&mut self, trip_id: i32) -> Result<Vec<Destination>, DbError> {
        let rows = sqlx::query_as::<_, Destination>(&format!(
            "SELECT {DESTINATION_COLUMNS} FROM destination WHERE trip_id = $1 ORDER BY id"
        ))
        .bind(trip_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }

    /// Insert a destination under `trip_id`.
    ///
    /// Row security only admits the insert when the caller owns the trip.
    pub async fn create(
        &mut self,
        trip_id: i32,
        destination: &NewDestination,
    ) -> Result<Destination, DbError> {
        let (latitude, longitude) = destination
            .coordinates
            .map(|c| (Some(c.latitude), Some(c.longitude)))
            .unwrap_or((None, None));

        sqlx::query_as::<_, Destination>(&format!(
            "INSERT INTO destination (trip_id, name, description, latitude, longitude, country, \
             cover_image) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {DESTINATION_COLUMNS}"
        ))
        .bind(trip_id)
        .bind(destination.name.as_str())
        .bind(destination.description.as_deref())
        .bind(latitude)
        .bind(longitude)
        .bind(destination.country.as_deref())
        .bind(destination.cover_image.as_deref())
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| DbError::from_write(e, "destination", ("trip", trip_id.to_string())))
    }
}
