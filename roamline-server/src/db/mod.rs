//! Database layer - connection pool, migrations and repositories
//!
//! Repositories borrow the request session's connection, so every query runs
//! inside the session transaction with its security context applied.

pub mod migrations;
pub mod pool;
pub mod repos;

pub use pool::{create_pool, create_pool_with_options, DEFAULT_MAX_CONNECTIONS};
pub use repos::*;
pub use sqlx::PgPool;

/// SQLSTATE for foreign key violations
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// SQLSTATE raised when a row violates a row-security WITH CHECK clause
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    /// A write was rejected by a row-security policy
    #[error("{resource} write rejected by row security")]
    PolicyViolation { resource: &'static str },
}

impl DbError {
    /// Classify a write failure against `resource`, whose parent is `parent`.
    pub(crate) fn from_write(
        err: sqlx::Error,
        resource: &'static str,
        parent: (&'static str, String),
    ) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());

        match code.as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => DbError::NotFound {
                resource: parent.0,
                id: parent.1,
            },
            Some(INSUFFICIENT_PRIVILEGE) => DbError::PolicyViolation { resource },
            _ => DbError::Sqlx(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_pass_through() {
        let err = DbError::from_write(sqlx::Error::RowNotFound, "trip", ("trip", "1".into()));
        assert!(matches!(err, DbError::Sqlx(sqlx::Error::RowNotFound)));
    }
}
