//! Policy verification harness
//!
//! Runs probe queries under synthetic identities to observe what row-security
//! actually lets through. Every probe gets its own short transaction on its own
//! connection and is always rolled back, whatever the probe did.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{SqlIdent, ValidationError};
use crate::session::manager::BoundConnection;
use crate::session::{
    ConnectionSource, Disposition, Identity, SecurityContext, SessionConnection, SessionError,
    SessionManager,
};

use super::report::{AggregateReport, CheckResult, Verdict};

pub const POLICY_EXISTS: &str = "policy_exists";
pub const RLS_ENABLED: &str = "rls_enabled_and_forced";
pub const ANONYMOUS_ACCESS: &str = "anonymous_cannot_see_private_rows";
pub const STRANGER_ACCESS: &str = "stranger_cannot_see_private_rows";
pub const OWNER_ACCESS: &str = "owner_can_see_own_rows";

const OWNER_REQUIRED: &str = "pass an owner id to enable";

/// A probe failed to run. Reported as a failed check, never aborts a batch.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("could not open probe transaction: {0}")]
    Session(#[from] SessionError),

    #[error("probe query failed: {0}")]
    Query(#[source] sqlx::Error),
}

/// Query executed by a check; `params` bind to `$1..$n` as text.
#[derive(Debug, Clone)]
pub struct Probe {
    pub sql: String,
    pub params: Vec<String>,
}

impl Probe {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }
}

/// Which table and policy the standard checks look at.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub table: SqlIdent,
    pub policy: SqlIdent,
    pub owner_column: SqlIdent,
    pub visibility_column: SqlIdent,
    /// Max rows captured as evidence per probe
    pub sample_limit: u32,
}

impl HarnessConfig {
    pub fn new(
        table: &str,
        policy: &str,
        owner_column: &str,
        visibility_column: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            table: SqlIdent::new("table", table)?,
            policy: SqlIdent::new("policy", policy)?,
            owner_column: SqlIdent::new("owner column", owner_column)?,
            visibility_column: SqlIdent::new("visibility column", visibility_column)?,
            sample_limit: 5,
        })
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new("trip", "trips_select", "user_id", "is_public")
            .expect("default harness identifiers are valid")
    }
}

/// Runs the standard isolation checks against a pool.
pub struct PolicyHarness<P> {
    pool: Arc<P>,
    acquire_timeout: Duration,
    config: HarnessConfig,
}

impl<P> Clone for PolicyHarness<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            acquire_timeout: self.acquire_timeout,
            config: self.config.clone(),
        }
    }
}

impl<P: ConnectionSource> PolicyHarness<P> {
    /// Shares the manager's pool; probes never touch a request's session.
    pub fn new(manager: &SessionManager<P>, config: HarnessConfig) -> Self {
        Self {
            pool: manager.shared_pool(),
            acquire_timeout: manager.acquire_timeout(),
            config,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Execute `probe` under `identity` (anonymous when `None`) and roll back.
    pub async fn run_probe(
        &self,
        identity: Option<&Identity>,
        probe: &Probe,
    ) -> Result<Vec<Value>, CheckError> {
        let context = SecurityContext::for_identity(identity);
        let mut bound = BoundConnection::open(&*self.pool, self.acquire_timeout, context).await?;

        let rows = bound.conn().fetch_json(&probe.sql, &probe.params).await;
        let outcome = bound.close(Disposition::Rollback).await;
        tracing::debug!(
            principal = identity.map(Identity::principal).unwrap_or("<anonymous>"),
            ?outcome,
            "probe finished"
        );

        rows.map_err(CheckError::Query)
    }

    /// Run one probe and judge its rows. Execution errors become a failed check
    /// with the error as evidence.
    pub async fn run_check<F>(
        &self,
        name: &str,
        identity: Option<&Identity>,
        probe: &Probe,
        judge: F,
    ) -> CheckResult
    where
        F: FnOnce(&[Value]) -> Verdict + Send,
    {
        match self.run_probe(identity, probe).await {
            Ok(rows) => CheckResult::from_verdict(name, judge(&rows)),
            Err(e) => {
                tracing::warn!(check = name, error = %e, "RLS check could not execute");
                CheckResult::from_verdict(
                    name,
                    Verdict::fail(
                        json!({ "error": e.to_string() }),
                        "The probe could not run; check database connectivity and that the table exists.",
                    ),
                )
            }
        }
    }

    /// (a) the policy exists in `pg_policies`.
    pub async fn check_policy_exists(&self) -> CheckResult {
        let cfg = &self.config;
        let probe = Probe::new(
            "SELECT policyname, permissive, roles, cmd, qual \
             FROM pg_policies WHERE tablename = $1 AND policyname = $2",
        )
        .bind(cfg.table.as_str())
        .bind(cfg.policy.as_str());

        let remediation = format!(
            "Policy \"{}\" is missing from pg_policies for table \"{}\". Run its CREATE POLICY statement.",
            cfg.policy, cfg.table
        );
        self.run_check(POLICY_EXISTS, None, &probe, move |rows| match rows.first() {
            Some(row) => Verdict::pass(row.clone()),
            None => Verdict::fail(Value::Null, remediation),
        })
        .await
    }

    /// (b) row security is enabled and forced (owner cannot bypass it).
    pub async fn check_rls_enabled(&self) -> CheckResult {
        let table = self.config.table.clone();
        let probe = Probe::new(
            "SELECT relname, relrowsecurity, relforcerowsecurity \
             FROM pg_class WHERE oid = to_regclass($1)",
        )
        .bind(table.as_str());

        self.run_check(RLS_ENABLED, None, &probe, move |rows| {
            let Some(row) = rows.first() else {
                return Verdict::fail(
                    Value::Null,
                    format!("Table \"{table}\" was not found on the search_path."),
                );
            };

            let mut fixes = Vec::new();
            if row["relrowsecurity"] != Value::Bool(true) {
                fixes.push(format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY;"));
            }
            if row["relforcerowsecurity"] != Value::Bool(true) {
                fixes.push(format!("ALTER TABLE {table} FORCE ROW LEVEL SECURITY;"));
            }

            if fixes.is_empty() {
                Verdict::pass(row.clone())
            } else {
                Verdict::fail(row.clone(), fixes.join(" | "))
            }
        })
        .await
    }

    /// (c) no identity, no private rows.
    pub async fn check_anonymous_access(&self) -> CheckResult {
        let cfg = &self.config;
        let probe = Probe::new(format!(
            "SELECT * FROM {} WHERE {} = false LIMIT {}",
            cfg.table, cfg.visibility_column, cfg.sample_limit
        ));

        let table = cfg.table.clone();
        self.run_check(ANONYMOUS_ACCESS, None, &probe, move |rows| {
            if rows.is_empty() {
                Verdict::pass(json!({ "private_rows_exposed": 0 }))
            } else {
                Verdict::fail(
                    json!({ "private_rows_exposed": rows.len(), "exposed_rows": rows }),
                    format!(
                        "CRITICAL: {} private row(s) of {table} visible without an identity. \
                         Verify auth.user_id() reads the app.user_id setting and the policy requires it.",
                        rows.len()
                    ),
                )
            }
        })
        .await
    }

    /// (d) someone else sees none of the owner's private rows.
    pub async fn check_stranger_access(&self, owner: &Identity) -> CheckResult {
        let cfg = &self.config;
        let stranger_id = format!("debug_stranger_{}", Uuid::new_v4().simple());
        let stranger = match Identity::new(stranger_id) {
            Ok(stranger) => stranger,
            Err(e) => {
                return CheckResult::from_verdict(
                    STRANGER_ACCESS,
                    Verdict::fail(json!({ "error": e.to_string() }), "could not build stranger identity"),
                )
            }
        };
        let probe = Probe::new(format!(
            "SELECT * FROM {} WHERE {} = $1 AND {} = false LIMIT {}",
            cfg.table, cfg.owner_column, cfg.visibility_column, cfg.sample_limit
        ))
        .bind(owner.principal());

        let owner_id = owner.principal().to_string();
        let stranger_id = stranger.principal().to_string();
        let policy = cfg.policy.clone();
        self.run_check(STRANGER_ACCESS, Some(&stranger), &probe, move |rows| {
            let mut evidence = json!({
                "owner_id": owner_id,
                "stranger_id": stranger_id,
                "private_rows_exposed": rows.len(),
            });
            if rows.is_empty() {
                Verdict::pass(evidence)
            } else {
                evidence["exposed_rows"] = json!(rows);
                Verdict::fail(
                    evidence,
                    format!(
                        "CRITICAL: a stranger can read {} private row(s) owned by {owner_id}. \
                         The USING clause of {policy} is not filtering correctly.",
                        rows.len()
                    ),
                )
            }
        })
        .await
    }

    /// (e) the owner sees their own rows, private or not.
    pub async fn check_owner_access(&self, owner: &Identity) -> CheckResult {
        let cfg = &self.config;
        let probe = Probe::new(format!(
            "SELECT * FROM {} WHERE {} = $1 LIMIT {}",
            cfg.table,
            cfg.owner_column,
            cfg.sample_limit * 2
        ))
        .bind(owner.principal());

        let owner_id = owner.principal().to_string();
        let (table, owner_column) = (cfg.table.clone(), cfg.owner_column.clone());
        self.run_check(OWNER_ACCESS, Some(owner), &probe, move |rows| {
            let evidence = json!({
                "owner_id": owner_id,
                "rows_visible": rows.len(),
                "sample": rows.iter().take(3).collect::<Vec<_>>(),
            });
            if rows.is_empty() {
                Verdict::fail(
                    evidence,
                    format!(
                        "No {table} rows are visible to {owner_id}. Seed a row for this owner, \
                         or check that the policy admits {owner_column} = auth.user_id()."
                    ),
                )
            } else {
                Verdict::pass(evidence)
            }
        })
        .await
    }

    /// Run every standard check concurrently. Owner-specific checks are skipped
    /// without an owner.
    pub async fn run_all(&self, owner: Option<&Identity>) -> AggregateReport {
        let stranger = async {
            match owner {
                Some(owner) => self.check_stranger_access(owner).await,
                None => CheckResult::skipped(STRANGER_ACCESS, OWNER_REQUIRED),
            }
        };
        let owned = async {
            match owner {
                Some(owner) => self.check_owner_access(owner).await,
                None => CheckResult::skipped(OWNER_ACCESS, OWNER_REQUIRED),
            }
        };

        let (policy, enabled, anonymous, stranger, owned) = tokio::join!(
            self.check_policy_exists(),
            self.check_rls_enabled(),
            self.check_anonymous_access(),
            stranger,
            owned,
        );

        let report = AggregateReport::from_checks(vec![policy, enabled, anonymous, stranger, owned]);
        if !report.all_passed {
            let failed: Vec<&str> = report.failed().map(|c| c.check.as_str()).collect();
            tracing::warn!(failed = %failed.join(", "), "RLS check failures");
        }
        report
    }
}
