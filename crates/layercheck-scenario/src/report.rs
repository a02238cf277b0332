//! Run-all-and-report execution of several scenarios.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use layercheck_common::ErrorKind;

use crate::orchestrator::ScenarioOrchestrator;
use crate::outcome::{Phase, ScenarioOutcome};

/// How one scenario ended
#[derive(Clone, Debug)]
pub struct ScenarioRecord {
    /// Scenario name
    pub name: String,
    /// Whether every phase and the teardown passed
    pub passed: bool,
    /// Wall-clock time including teardown
    pub duration: Duration,
    /// Phase that failed
    pub phase: Option<Phase>,
    /// Category of the failure
    pub error_kind: Option<ErrorKind>,
    /// Failure message
    pub error: Option<String>,
    /// Image the build published
    pub image: Option<String>,
}

/// Returned by [`SuiteReport::finish`] when any scenario failed
#[derive(Debug, thiserror::Error)]
#[error("{} scenario(s) failed in {suite}: {}", .failed.len(), .failed.join(", "))]
pub struct SuiteFailed {
    /// Suite name
    pub suite: String,
    /// Names of the failed scenarios
    pub failed: Vec<String>,
}

/// Collects scenario results and prints a summary
pub struct SuiteReport {
    suite: String,
    results: Vec<ScenarioRecord>,
}

impl SuiteReport {
    /// Empty report
    pub fn new(suite: &str) -> Self {
        Self {
            suite: suite.to_string(),
            results: Vec::new(),
        }
    }

    /// Run one scenario and record how it ended
    pub async fn run(&mut self, orchestrator: &ScenarioOrchestrator) -> Option<ScenarioOutcome> {
        let start = Instant::now();
        let name = orchestrator.options().name.clone();

        match orchestrator.run().await {
            Ok(outcome) => {
                self.results.push(ScenarioRecord {
                    name,
                    passed: true,
                    duration: start.elapsed(),
                    phase: None,
                    error_kind: None,
                    error: None,
                    image: Some(outcome.image_pullspec.clone()),
                });
                Some(outcome)
            }
            Err(e) => {
                self.results.push(ScenarioRecord {
                    name,
                    passed: false,
                    duration: start.elapsed(),
                    phase: Some(e.phase),
                    error_kind: Some(e.kind()),
                    error: Some(e.source.to_string()),
                    image: None,
                });
                None
            }
        }
    }

    /// Record a result obtained elsewhere
    pub fn record(&mut self, record: ScenarioRecord) {
        self.results.push(record);
    }

    /// Results so far, in run order
    pub fn results(&self) -> &[ScenarioRecord] {
        &self.results
    }

    /// Summary lines, as logged by [`finish`](Self::finish)
    pub fn summary(&self) -> Vec<String> {
        let total: Duration = self.results.iter().map(|r| r.duration).sum();
        let passed = self.results.iter().filter(|r| r.passed).count();
        let failed = self.results.len() - passed;

        let mut lines = vec![
            "========================================".to_string(),
            format!("  {}", self.suite.to_uppercase()),
            "========================================".to_string(),
        ];
        for r in &self.results {
            let tag = if r.passed { "PASS" } else { "FAIL" };
            lines.push(format!(
                "  {tag}  {:40} {:.1}s",
                r.name,
                r.duration.as_secs_f64()
            ));
            if let (Some(phase), Some(kind)) = (r.phase, r.error_kind) {
                lines.push(format!("        -> {} in {}", kind, phase));
            }
            if let Some(ref e) = r.error {
                // Long errors make the summary unreadable
                let truncated: String = e.chars().take(200).collect();
                lines.push(format!("        -> {truncated}"));
            }
        }
        lines.push("----------------------------------------".to_string());
        lines.push(format!(
            "  {} passed, {} failed ({:.1}s total)",
            passed,
            failed,
            total.as_secs_f64()
        ));
        lines.push("========================================".to_string());
        lines
    }

    /// Log the summary; fail if any scenario failed
    pub fn finish(&self) -> Result<(), SuiteFailed> {
        for line in self.summary() {
            info!("{}", line);
        }

        let failed: Vec<String> = self
            .results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.name.clone())
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(SuiteFailed {
                suite: self.suite.clone(),
                failed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, passed: bool) -> ScenarioRecord {
        ScenarioRecord {
            name: name.to_string(),
            passed,
            duration: Duration::from_secs(90),
            phase: (!passed).then_some(Phase::BuildCompletion),
            error_kind: (!passed).then_some(ErrorKind::Unrecoverable),
            error: (!passed).then(|| "build for pool layered failed".to_string()),
            image: passed.then(|| "registry/os@sha256:1".to_string()),
        }
    }

    #[test]
    fn all_passing_suite_finishes_ok() {
        let mut report = SuiteReport::new("builds");
        report.record(record("a", true));
        report.record(record("b", true));
        assert!(report.finish().is_ok());
        assert!(report
            .summary()
            .iter()
            .any(|l| l.contains("2 passed, 0 failed")));
    }

    #[test]
    fn failures_are_named_with_phase() {
        let mut report = SuiteReport::new("builds");
        report.record(record("ok", true));
        report.record(record("broken", false));

        let summary = report.summary();
        assert!(summary.iter().any(|l| l.contains("FAIL  broken")));
        assert!(summary
            .iter()
            .any(|l| l.contains("UnrecoverableState in BuildCompletion")));

        let err = report.finish().unwrap_err();
        assert_eq!(err.failed, vec!["broken"]);
        assert_eq!(err.to_string(), "1 scenario(s) failed in builds: broken");
    }
}
