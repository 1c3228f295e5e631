//! Trip repository
//!
//! - list: window count for the total (single query)
//! - update/delete: a row hidden by policy reads as not found

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgConnection, Row};

use crate::models::{NewTrip, Paginated, Pagination, TripPatch};
use crate::db::DbError;

const TRIP_COLUMNS: &str = "id, name, description, latitude, longitude, country, start_date, \
     end_date, cover_image, gallery, is_favorite, is_public, user_id, created_at, updated_at";

/// Trip record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Trip {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub cover_image: Option<String>,
    pub gallery: Value,
    pub is_favorite: bool,
    pub is_public: bool,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trip repository
pub struct TripRepo<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> TripRepo<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }

    /// List trips visible to the current security context, newest first.
    pub async fn list(&mut self, page: Pagination) -> Result<Paginated<Trip>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS}, COUNT(*) OVER() AS total \
             FROM trip ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&mut *self.conn)
        .await?;

        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(Trip::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated::new(items, total, page))
    }

    pub async fn get(&mut self, id: i32) -> Result<Trip, DbError> {
        sqlx::query_as::<_, Trip>(&format!("SELECT {TRIP_COLUMNS} FROM trip WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Insert a trip owned by the current identity.
    pub async fn create(&mut self, trip: &NewTrip) -> Result<Trip, DbError> {
        sqlx::query_as::<_, Trip>(&format!(
            "INSERT INTO trip (name, description, latitude, longitude, country, start_date, \
             end_date, cover_image, is_public) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {TRIP_COLUMNS}"
        ))
        .bind(trip.name.as_str())
        .bind(trip.description.as_deref())
        .bind(trip.coordinates.latitude)
        .bind(trip.coordinates.longitude)
        .bind(trip.country.as_deref())
        .bind(trip.start_date)
        .bind(trip.end_date)
        .bind(trip.cover_image.as_deref())
        .bind(trip.is_public)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| DbError::from_write(e, "trip", ("trip", String::new())))
    }

    pub async fn update(&mut self, id: i32, patch: &TripPatch) -> Result<Trip, DbError> {
        sqlx::query_as::<_, Trip>(&format!(
            "UPDATE trip SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                is_favorite = COALESCE($4, is_favorite), \
                is_public = COALESCE($5, is_public), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {TRIP_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.name.as_ref().map(|n| n.as_str()))
        .bind(patch.description.as_deref())
        .bind(patch.is_favorite)
        .bind(patch.is_public)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| DbError::from_write(e, "trip", ("trip", id.to_string())))?
        .ok_or_else(|| not_found(id))
    }

    pub async fn delete(&mut self, id: i32) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM trip WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

fn not_found(id: i32) -> DbError {
    DbError::NotFound {
        resource: "trip",
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateTripRequest, Name};
    use crate::session::{Finalization, Identity, SessionManager, DEFAULT_ACQUIRE_TIMEOUT};
    use sqlx::PgPool;

    // Integration tests - run with DATABASE_URL set
    // cargo test -p roamline-server -- --ignored

    async fn manager() -> SessionManager<PgPool> {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        crate::db::migrations::run(&pool).await.expect("migrations");
        SessionManager::new(pool, DEFAULT_ACQUIRE_TIMEOUT)
    }

    fn new_trip(name: &str, is_public: bool) -> NewTrip {
        NewTrip::try_from(CreateTripRequest {
            name: name.into(),
            description: None,
            latitude: 41.15,
            longitude: -8.61,
            country: None,
            start_date: None,
            end_date: None,
            cover_image: None,
            is_public,
        })
        .expect("valid trip")
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn owner_sees_private_trip_stranger_does_not() {
        let manager = manager().await;
        let owner = Identity::new(format!("owner_{}", uuid::Uuid::new_v4().simple())).unwrap();
        let stranger = Identity::new(format!("stranger_{}", uuid::Uuid::new_v4().simple())).unwrap();

        let session = manager.request_session();
        let trip = {
            let mut conn = session.acquire(Some(&owner)).await.expect("acquire");
            let created = TripRepo::new(&mut conn)
                .create(&new_trip("private", false))
                .await
                .expect("create");
            created
        };
        assert_eq!(trip.user_id, owner.principal());
        assert_eq!(session.finalize().await, Finalization::Committed);

        let session = manager.request_session();
        {
            let mut conn = session.acquire(Some(&stranger)).await.expect("acquire");
            let err = TripRepo::new(&mut conn).get(trip.id).await.unwrap_err();
            assert!(matches!(err, DbError::NotFound { .. }));

            let err = TripRepo::new(&mut conn)
                .update(
                    trip.id,
                    &TripPatch {
                        name: Some(Name::new("hijacked").unwrap()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, DbError::NotFound { .. }));
        }
        assert_eq!(session.finalize().await, Finalization::Committed);

        let session = manager.request_session();
        {
            let mut conn = session.acquire(Some(&owner)).await.expect("acquire");
            TripRepo::new(&mut conn).delete(trip.id).await.expect("owner delete");
        }
        assert_eq!(session.finalize().await, Finalization::Committed);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn anonymous_cannot_create() {
        let manager = manager().await;
        let session = manager.request_session();
        {
            let mut conn = session.acquire(None).await.expect("acquire");
            let result = TripRepo::new(&mut conn).create(&new_trip("nobody", true)).await;
            assert!(result.is_err());
        }
        session.abort().await;
    }
}
