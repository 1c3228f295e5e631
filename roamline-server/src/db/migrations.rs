//! Schema migrations
//!
//! Policies read the caller from `auth.user_id()`, which is the transaction-local
//! `app.user_id` setting with the empty string mapped to NULL. RLS is forced so
//! the table owner the service connects as is filtered too.

use sqlx::PgPool;

use super::DbError;

const STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS auth",
    r#"
    CREATE OR REPLACE FUNCTION auth.user_id() RETURNS text
    LANGUAGE sql STABLE
    AS $$ SELECT NULLIF(current_setting('app.user_id', true), '') $$
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trip (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        latitude DOUBLE PRECISION NOT NULL,
        longitude DOUBLE PRECISION NOT NULL,
        country TEXT,
        start_date TIMESTAMPTZ,
        end_date TIMESTAMPTZ,
        cover_image TEXT,
        gallery JSONB NOT NULL DEFAULT '[]',
        is_favorite BOOLEAN NOT NULL DEFAULT FALSE,
        is_public BOOLEAN NOT NULL DEFAULT FALSE,
        user_id TEXT NOT NULL DEFAULT auth.user_id(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS destination (
        id SERIAL PRIMARY KEY,
        trip_id INTEGER NOT NULL REFERENCES trip(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        latitude DOUBLE PRECISION,
        longitude DOUBLE PRECISION,
        country TEXT,
        cover_image TEXT,
        gallery JSONB NOT NULL DEFAULT '[]',
        is_favorite BOOLEAN NOT NULL DEFAULT FALSE,
        user_id TEXT NOT NULL DEFAULT auth.user_id(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS travel_detail (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        trip_id INTEGER NOT NULL REFERENCES trip(id) ON DELETE CASCADE,
        destination_id INTEGER REFERENCES destination(id) ON DELETE SET NULL,
        user_id TEXT NOT NULL DEFAULT auth.user_id(),
        detail_type TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        latitude DOUBLE PRECISION,
        longitude DOUBLE PRECISION,
        arrival_time TIMESTAMPTZ,
        departure_time TIMESTAMPTZ,
        is_verified BOOLEAN NOT NULL DEFAULT FALSE,
        is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
        deleted_at TIMESTAMPTZ,
        gallery JSONB NOT NULL DEFAULT '[]',
        "order" INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_trip_user ON trip(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_destination_trip ON destination(trip_id)",
    "CREATE INDEX IF NOT EXISTS idx_travel_detail_trip ON travel_detail(trip_id, \"order\")",
    "ALTER TABLE trip ENABLE ROW LEVEL SECURITY",
    "ALTER TABLE trip FORCE ROW LEVEL SECURITY",
    "ALTER TABLE destination ENABLE ROW LEVEL SECURITY",
    "ALTER TABLE destination FORCE ROW LEVEL SECURITY",
    "ALTER TABLE travel_detail ENABLE ROW LEVEL SECURITY",
    "ALTER TABLE travel_detail FORCE ROW LEVEL SECURITY",
    // trip
    "DROP POLICY IF EXISTS trips_select ON trip",
    r#"
    CREATE POLICY trips_select ON trip FOR SELECT
    USING (is_public OR user_id = auth.user_id())
    "#,
    "DROP POLICY IF EXISTS trips_modify ON trip",
    r#"
    CREATE POLICY trips_modify ON trip FOR ALL
    USING (user_id = auth.user_id())
    WITH CHECK (user_id = auth.user_id())
    "#,
    // destination: readable alongside a readable trip, writable by the trip owner
    "DROP POLICY IF EXISTS destinations_select ON destination",
    r#"
    CREATE POLICY destinations_select ON destination FOR SELECT
    USING (
        user_id = auth.user_id()
        OR EXISTS (SELECT 1 FROM trip t WHERE t.id = trip_id AND t.is_public)
    )
    "#,
    "DROP POLICY IF EXISTS destinations_modify ON destination",
    r#"
    CREATE POLICY destinations_modify ON destination FOR ALL
    USING (user_id = auth.user_id())
    WITH CHECK (
        user_id = auth.user_id()
        AND EXISTS (SELECT 1 FROM trip t WHERE t.id = trip_id AND t.user_id = auth.user_id())
    )
    "#,
    // travel_detail
    "DROP POLICY IF EXISTS travel_details_select ON travel_detail",
    r#"
    CREATE POLICY travel_details_select ON travel_detail FOR SELECT
    USING (
        user_id = auth.user_id()
        OR EXISTS (SELECT 1 FROM trip t WHERE t.id = trip_id AND t.is_public)
    )
    "#,
    "DROP POLICY IF EXISTS travel_details_modify ON travel_detail",
    r#"
    CREATE POLICY travel_details_modify ON travel_detail FOR ALL
    USING (user_id = auth.user_id())
    WITH CHECK (
        user_id = auth.user_id()
        AND EXISTS (SELECT 1 FROM trip t WHERE t.id = trip_id AND t.user_id = auth.user_id())
    )
    "#,
];

/// Run all migrations in one transaction.
pub async fn run(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!("Running migrations...");

    let mut tx = pool.begin().await?;
    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!(statements = STATEMENTS.len(), "Migrations complete");
    Ok(())
}
