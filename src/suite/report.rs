//! Suite results and summary output

use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use serde::Serialize;

use crate::common::Result;

/// Outcome of one case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    /// Filtered out by focus
    Skipped,
    /// Never reached because setup failed
    NotRun,
}

/// Result of a single registered case
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub status: CaseStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseResult {
    pub fn passed(name: &str, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status: CaseStatus::Passed,
            duration_ms: duration.as_millis() as u64,
            error: None,
        }
    }

    pub fn failed(name: &str, duration: Duration, error: String) -> Self {
        Self {
            name: name.to_string(),
            status: CaseStatus::Failed,
            duration_ms: duration.as_millis() as u64,
            error: Some(error),
        }
    }

    pub fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CaseStatus::Skipped,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn not_run(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CaseStatus::NotRun,
            duration_ms: 0,
            error: None,
        }
    }

    /// Print the one-line progress entry for this case
    pub fn print_line(&self) {
        let secs = self.duration_ms as f64 / 1000.0;
        match self.status {
            CaseStatus::Passed => {
                println!("  {} {} {}", "✓".green(), self.name, format!("({secs:.1}s)").dimmed())
            }
            CaseStatus::Failed => {
                println!("  {} {} {}", "✗".red(), self.name, format!("({secs:.1}s)").dimmed());
                if let Some(error) = &self.error {
                    for line in error.lines() {
                        println!("      {}", line.red());
                    }
                }
            }
            CaseStatus::Skipped => println!("  {} {}", "-".yellow(), self.name.dimmed()),
            CaseStatus::NotRun => {}
        }
    }
}

/// Aggregate report for one suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub description: String,
    pub results: Vec<CaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
}

impl SuiteReport {
    pub fn count(&self, status: CaseStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results
            .iter()
            .filter(|r| r.status == CaseStatus::Failed)
    }

    /// True if setup, teardown and every executed case succeeded
    pub fn success(&self) -> bool {
        self.setup_error.is_none()
            && self.teardown_error.is_none()
            && self.count(CaseStatus::Failed) == 0
    }

    /// Process exit code: 0 ok, 1 case failures, 2 lifecycle failure
    pub fn exit_code(&self) -> i32 {
        if self.setup_error.is_some() || self.teardown_error.is_some() {
            2
        } else if self.count(CaseStatus::Failed) > 0 {
            1
        } else {
            0
        }
    }

    /// Print the end-of-run summary
    pub fn print_summary(&self) {
        if let Some(error) = &self.setup_error {
            println!(
                "\n{} {}",
                "Suite setup failed, no cases were run:".red().bold(),
                error
            );
        }
        if let Some(error) = &self.teardown_error {
            println!("\n{} {}", "Suite teardown failed:".red().bold(), error);
        }

        let failed: Vec<&CaseResult> = self.failures().collect();
        if !failed.is_empty() {
            println!("\n{}", "Failures:".red().bold());
            for result in &failed {
                println!("  {} {}", "✗".red(), result.name);
                if let Some(error) = &result.error {
                    println!("      {}", error.dimmed());
                }
            }
        }

        let summary = format!(
            "{} passed, {} failed, {} skipped, {} not run",
            self.count(CaseStatus::Passed),
            self.count(CaseStatus::Failed),
            self.count(CaseStatus::Skipped),
            self.count(CaseStatus::NotRun),
        );
        if self.success() {
            println!("\n{} {}\n", "✓".green().bold(), summary.green().bold());
        } else {
            println!("\n{} {}\n", "✗".red().bold(), summary.red().bold());
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(results: Vec<CaseResult>) -> SuiteReport {
        SuiteReport {
            description: "E2E".to_string(),
            results,
            setup_error: None,
            teardown_error: None,
        }
    }

    #[test]
    fn test_exit_codes() {
        let ok = report(vec![
            CaseResult::passed("pull", Duration::from_millis(10)),
            CaseResult::skipped("push"),
        ]);
        assert_eq!(ok.exit_code(), 0);

        let failed = report(vec![CaseResult::failed(
            "pull",
            Duration::ZERO,
            "boom".to_string(),
        )]);
        assert_eq!(failed.exit_code(), 1);

        let mut aborted = report(vec![CaseResult::not_run("pull")]);
        aborted.setup_error = Some("VM start failed".to_string());
        assert_eq!(aborted.exit_code(), 2);
        assert!(!aborted.success());
    }

    #[test]
    fn test_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        report(vec![CaseResult::failed(
            "rmi",
            Duration::from_millis(1500),
            "still present".to_string(),
        )])
        .write_json(&path)
        .unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["results"][0]["status"], "failed");
        assert_eq!(value["results"][0]["duration_ms"], 1500);
        assert!(value.get("setup_error").is_none());
    }
}
