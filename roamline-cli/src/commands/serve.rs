//! `roamline serve` - run the HTTP API

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::Parser;

use roamline_server::config::{DEFAULT_CLAIMS_HEADER, DEFAULT_IDENTITY_HEADER};
use roamline_server::{run_server, ServerConfig};

use super::DbArgs;

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(long, short = 'b', env = "ROAMLINE_BIND_ADDR", default_value = "127.0.0.1:3030")]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub db: DbArgs,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long, env = "ROAMLINE_CORS_PERMISSIVE", value_parser = FalseyValueParser::new())]
    pub cors_permissive: bool,

    /// Header carrying the authenticated principal
    #[arg(long, env = "ROAMLINE_IDENTITY_HEADER", default_value = DEFAULT_IDENTITY_HEADER)]
    pub identity_header: String,

    /// Header carrying the principal's claims (JSON object)
    #[arg(long, env = "ROAMLINE_CLAIMS_HEADER", default_value = DEFAULT_CLAIMS_HEADER)]
    pub claims_header: String,

    /// Mount /debug/rls/* (never in production)
    #[arg(long, env = "ROAMLINE_DEBUG_ROUTES", value_parser = FalseyValueParser::new())]
    pub debug_routes: bool,

    /// Apply migrations before listening
    #[arg(long, env = "ROAMLINE_RUN_MIGRATIONS", value_parser = FalseyValueParser::new())]
    pub migrate: bool,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        let acquire_timeout = args.db.acquire_timeout();
        ServerConfig {
            bind_addr: args.bind,
            database_url: args.db.database_url,
            max_connections: args.db.max_connections,
            acquire_timeout,
            cors_permissive: args.cors_permissive,
            identity_header: args.identity_header,
            claims_header: args.claims_header,
            debug_routes: args.debug_routes,
            run_migrations: args.migrate,
        }
    }
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig::from(args);
    config.validate().context("Invalid server configuration")?;

    tracing::info!(bind = %config.bind_addr, debug_routes = config.debug_routes, "Starting roamline server");

    run_server(config).await.context("Server error")?;
    Ok(())
}
