//! Travel detail repository
//!
//! Deletion is soft: rows are flagged `is_deleted` and drop out of listings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::db::DbError;
use crate::models::NewTravelDetail;

const DETAIL_COLUMNS: &str = "id, trip_id, destination_id, user_id, detail_type, name, \
     description, latitude, longitude, arrival_time, departure_time, is_verified, gallery, \
     \"order\", created_at, updated_at";

/// Travel detail record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TravelDetail {
    pub id: Uuid,
    pub trip_id: i32,
    pub destination_id: Option<i32>,
    pub user_id: String,
    pub detail_type: String,
    pub name: String,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub departure_time: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub gallery: Value,
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Travel detail repository
pub struct TravelDetailRepo<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> TravelDetailRepo<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }

    /// Live details of a trip ordered by itinerary position.
    pub async fn list_by_trip(&mut self, trip_id: i32) -> Result<Vec<TravelDetail>, DbError> {
        let rows = sqlx::query_as::<_, TravelDetail>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM travel_detail \
             WHERE trip_id = $1 AND NOT is_deleted \
             ORDER BY \"order\", created_at"
        ))
        .bind(trip_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }

    pub async fn create(
        &mut self,
        trip_id: i32,
        detail: &NewTravelDetail,
    ) -> Result<TravelDetail, DbError> {
        let (latitude, longitude) = detail
            .coordinates
            .map(|c| (Some(c.latitude), Some(c.longitude)))
            .unwrap_or((None, None));

        sqlx::query_as::<_, TravelDetail>(&format!(
            "INSERT INTO travel_detail (trip_id, destination_id, detail_type, name, description, \
             latitude, longitude, arrival_time, departure_time, \"order\") \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {DETAIL_COLUMNS}"
        ))
        .bind(trip_id)
        .bind(detail.destination_id)
        .bind(detail.kind.as_str())
        .bind(detail.name.as_str())
        .bind(detail.description.as_deref())
        .bind(latitude)
        .bind(longitude)
        .bind(detail.arrival_time)
        .bind(detail.departure_time)
        .bind(detail.order)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| DbError::from_write(e, "travel_detail", ("trip", trip_id.to_string())))
    }

    /// Flag a detail as deleted. Already-deleted or hidden rows are not found.
    pub async fn soft_delete(&mut self, id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE travel_detail
            SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| DbError::from_write(e, "travel_detail", ("travel_detail", id.to_string())))?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound {
                resource: "travel_detail",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
