//! Row-security verification harness
//!
//! Diagnostic only. Impersonates identities inside always-rolled-back
//! transactions to check that policies isolate rows as intended. Exposed through
//! the debug routes (non-production) and `roamline rls-check`.

pub mod harness;
pub mod report;

pub use harness::{
    CheckError, HarnessConfig, PolicyHarness, Probe, ANONYMOUS_ACCESS, OWNER_ACCESS,
    POLICY_EXISTS, RLS_ENABLED, STRANGER_ACCESS,
};
pub use report::{AggregateReport, CheckResult, CheckStatus, Verdict};
