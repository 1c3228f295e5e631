//! Pool and connection seams used by the session manager and the RLS harness
//!
//! Production code runs on sqlx's `PgPool`; tests substitute an in-memory pool
//! that records every statement.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Executor, PgPool, Postgres, Row};

/// SQLSTATE for statements sent after an error inside the same transaction
const IN_FAILED_TRANSACTION: &str = "25P02";

/// Something that lends out database connections.
///
/// Returning a connection to the pool happens when it is dropped.
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    type Connection: SessionConnection;

    async fn acquire(&self) -> Result<Self::Connection, sqlx::Error>;
}

/// The statements a session needs from a borrowed connection.
#[async_trait]
pub trait SessionConnection: Send + Sized + 'static {
    async fn begin(&mut self) -> Result<(), sqlx::Error>;

    /// Set `key` for the current transaction only. Must not return before the
    /// server acknowledged the statement.
    async fn set_local(&mut self, key: &str, value: &str) -> Result<(), sqlx::Error>;

    /// Run a probe and return each row as a JSON object. Writes must carry a
    /// `RETURNING` clause to yield rows.
    async fn fetch_json(&mut self, sql: &str, params: &[String]) -> Result<Vec<Value>, sqlx::Error>;

    /// Whether an earlier statement failed and left the transaction aborted.
    /// Postgres answers `COMMIT` on such a transaction with a silent rollback.
    async fn transaction_aborted(&mut self) -> Result<bool, sqlx::Error>;

    async fn commit(&mut self) -> Result<(), sqlx::Error>;

    async fn rollback(&mut self) -> Result<(), sqlx::Error>;

    /// Blank every key at session level so nothing survives into the next borrower.
    async fn clear(&mut self, keys: &[&str]) -> Result<(), sqlx::Error>;

    /// Close the connection instead of returning it to the pool.
    async fn discard(self);
}

#[async_trait]
impl ConnectionSource for PgPool {
    type Connection = PoolConnection<Postgres>;

    async fn acquire(&self) -> Result<Self::Connection, sqlx::Error> {
        PgPool::acquire(self).await
    }
}

#[async_trait]
impl SessionConnection for PoolConnection<Postgres> {
    async fn begin(&mut self) -> Result<(), sqlx::Error> {
        (&mut **self).execute("BEGIN").await?;
        Ok(())
    }

    async fn set_local(&mut self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT set_config($1, $2, true)")
            .bind(key)
            .bind(value)
            .execute(&mut **self)
            .await?;
        Ok(())
    }

    async fn fetch_json(&mut self, sql: &str, params: &[String]) -> Result<Vec<Value>, sqlx::Error> {
        // A CTE rather than a subquery: data-modifying statements are only
        // allowed in a top-level WITH
        let body = sql.trim().trim_end_matches(';').trim_end();
        let wrapped = format!("WITH probe AS ({body}) SELECT to_jsonb(probe) AS row FROM probe");
        let mut query = sqlx::query(&wrapped);
        for param in params {
            query = query.bind(param);
        }

        let rows = query.fetch_all(&mut **self).await?;
        rows.iter().map(|r| r.try_get::<Value, _>("row")).collect()
    }

    async fn transaction_aborted(&mut self) -> Result<bool, sqlx::Error> {
        match (&mut **self).execute("SELECT 1").await {
            Ok(_) => Ok(false),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(IN_FAILED_TRANSACTION) => {
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        (&mut **self).execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        (&mut **self).execute("ROLLBACK").await?;
        Ok(())
    }

    async fn clear(&mut self, keys: &[&str]) -> Result<(), sqlx::Error> {
        for key in keys {
            sqlx::query("SELECT set_config($1, '', false)")
                .bind(*key)
                .execute(&mut **self)
                .await?;
        }
        Ok(())
    }

    async fn discard(self) {
        if let Err(e) = self.detach().close().await {
            tracing::warn!(error = %e, "closing discarded connection failed");
        }
    }
}
