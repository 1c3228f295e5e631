//! Check results and the aggregate report returned to operators

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

/// Outcome of one check. Produced per run, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check: String,
    pub status: CheckStatus,
    pub passed: bool,
    pub evidence: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl CheckResult {
    pub fn from_verdict(check: impl Into<String>, verdict: Verdict) -> Self {
        let status = if verdict.passed {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        };
        Self {
            check: check.into(),
            status,
            passed: verdict.passed,
            evidence: verdict.evidence,
            remediation: if verdict.passed { None } else { verdict.remediation },
        }
    }

    pub fn skipped(check: impl Into<String>, reason: &str) -> Self {
        Self {
            check: check.into(),
            status: CheckStatus::Skipped,
            passed: false,
            evidence: json!({ "skipped": reason }),
            remediation: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status == CheckStatus::Skipped
    }
}

/// What a check concluded from the rows its probe returned.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub passed: bool,
    pub evidence: Value,
    /// Only reported when the check failed
    pub remediation: Option<String>,
}

impl Verdict {
    pub fn pass(evidence: Value) -> Self {
        Self {
            passed: true,
            evidence,
            remediation: None,
        }
    }

    pub fn fail(evidence: Value, remediation: impl Into<String>) -> Self {
        Self {
            passed: false,
            evidence,
            remediation: Some(remediation.into()),
        }
    }
}

/// Result of `run_all`
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub all_passed: bool,
    pub summary: String,
    pub checks: Vec<CheckResult>,
}

impl AggregateReport {
    /// `all_passed` ignores skipped checks.
    pub fn from_checks(checks: Vec<CheckResult>) -> Self {
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| c.status == CheckStatus::Failed)
            .map(|c| c.check.as_str())
            .collect();
        let skipped = checks.iter().filter(|c| c.is_skipped()).count();

        let mut summary = if failed.is_empty() {
            "All RLS checks passed.".to_string()
        } else {
            format!("{} check(s) failed: {}", failed.len(), failed.join(", "))
        };
        if skipped > 0 {
            summary.push_str(&format!(" {skipped} skipped."));
        }

        Self {
            all_passed: failed.is_empty(),
            summary,
            checks,
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_checks_do_not_fail_the_report() {
        let report = AggregateReport::from_checks(vec![
            CheckResult::from_verdict("a", Verdict::pass(Value::Null)),
            CheckResult::skipped("b", "no owner"),
        ]);

        assert!(report.all_passed);
        assert_eq!(report.summary, "All RLS checks passed. 1 skipped.");
    }

    #[test]
    fn any_failure_fails_the_report() {
        let report = AggregateReport::from_checks(vec![
            CheckResult::from_verdict("a", Verdict::pass(Value::Null)),
            CheckResult::from_verdict("b", Verdict::fail(Value::Null, "fix b")),
        ]);

        assert!(!report.all_passed);
        assert_eq!(report.summary, "1 check(s) failed: b");
        assert_eq!(report.failed().count(), 1);
    }

    #[test]
    fn remediation_only_reported_on_failure() {
        let verdict = Verdict {
            passed: true,
            evidence: Value::Null,
            remediation: Some("unused".into()),
        };
        let result = CheckResult::from_verdict("a", verdict);
        assert!(result.remediation.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "passed");
        assert!(json.get("remediation").is_none());
    }
}
