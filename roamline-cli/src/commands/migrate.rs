//! `roamline migrate` - create tables, the auth.user_id() helper and policies

use anyhow::{Context, Result};
use clap::Parser;

use roamline_server::db::migrations;

use super::DbArgs;

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub db: DbArgs,
}

pub async fn run_migrate(args: MigrateArgs) -> Result<()> {
    let pool = args.db.connect().await?;
    migrations::run(&pool).await.context("Migration failed")?;
    pool.close().await;

    println!("Schema is up to date.");
    Ok(())
}
