//! Subcommand implementations

pub mod migrate;
pub mod rls_check;
pub mod serve;

pub use migrate::{run_migrate, MigrateArgs};
pub use rls_check::{run_rls_check, RlsCheckArgs};
pub use serve::{run_serve, ServeArgs};

use anyhow::{Context, Result};
use clap::Args;
use roamline_server::db::{create_pool_with_options, PgPool, DEFAULT_MAX_CONNECTIONS};

/// Connection options shared by every subcommand that talks to Postgres
#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Maximum pooled connections
    #[arg(long, env = "ROAMLINE_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    /// How long to wait for a pooled connection, in milliseconds
    #[arg(long = "acquire-timeout-ms", env = "ROAMLINE_ACQUIRE_TIMEOUT_MS", default_value_t = 5000)]
    pub acquire_timeout_ms: u64,
}

impl DbArgs {
    pub fn acquire_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.acquire_timeout_ms)
    }

    pub async fn connect(&self) -> Result<PgPool> {
        create_pool_with_options(&self.database_url, self.max_connections, self.acquire_timeout())
            .await
            .context("Failed to create database pool")
    }
}
