//! `roamline rls-check` - run the policy verification harness once
//!
//! Prints the aggregate report as JSON. Exits non-zero when any check failed,
//! so it can gate a deploy.

use anyhow::{Context, Result};
use clap::Parser;

use roamline_server::rls::{HarnessConfig, PolicyHarness};
use roamline_server::session::{Identity, SessionManager};

use super::DbArgs;

#[derive(Parser, Debug)]
pub struct RlsCheckArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Owner whose rows drive the stranger and owner checks (skipped when absent)
    #[arg(long)]
    pub owner: Option<String>,

    /// Table protected by the policy
    #[arg(long, default_value = "trip")]
    pub table: String,

    /// Policy expected in pg_policies
    #[arg(long, default_value = "trips_select")]
    pub policy: String,

    /// Column holding the owning principal
    #[arg(long, default_value = "user_id")]
    pub owner_column: String,

    /// Boolean column marking rows readable by everyone
    #[arg(long, default_value = "is_public")]
    pub visibility_column: String,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,
}

/// Returns whether every non-skipped check passed.
pub async fn run_rls_check(args: RlsCheckArgs) -> Result<bool> {
    let config = HarnessConfig::new(
        &args.table,
        &args.policy,
        &args.owner_column,
        &args.visibility_column,
    )
    .context("Invalid harness target")?;
    let owner = args
        .owner
        .as_deref()
        .map(Identity::new)
        .transpose()
        .context("Invalid --owner")?;

    let pool = args.db.connect().await?;
    let sessions = SessionManager::new(pool.clone(), args.db.acquire_timeout());
    let harness = PolicyHarness::new(&sessions, config);

    let report = harness.run_all(owner.as_ref()).await;
    pool.close().await;

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    eprintln!("{}", report.summary);

    Ok(report.all_passed)
}
