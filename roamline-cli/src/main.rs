//! roamline CLI
//!
//! - `serve`: run the HTTP API (request-scoped sessions under row security)
//! - `migrate`: create the schema, the `auth.user_id()` helper and policies
//! - `rls-check`: verify the policies isolate rows, print a JSON report

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod tracing_setup;

use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "roamline",
    author,
    version,
    about = "Trip planning backend with Postgres row-level security",
    long_about = "Serves trips, destinations and travel details. Every request runs in its own \
                  transaction with the caller's identity published to row-security policies."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (requires the `telemetry` feature)
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::ServeArgs),
    /// Apply schema migrations
    Migrate(commands::MigrateArgs),
    /// Run the row-security verification harness
    RlsCheck(commands::RlsCheckArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env is fine
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_setup::init(&TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })?;

    let result = match cli.command {
        Commands::Serve(args) => commands::run_serve(args).await.map(|_| ExitCode::SUCCESS),
        Commands::Migrate(args) => commands::run_migrate(args).await.map(|_| ExitCode::SUCCESS),
        Commands::RlsCheck(args) => commands::run_rls_check(args).await.map(|passed| {
            if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }),
    };

    tracing_setup::shutdown_otel();
    result
}
