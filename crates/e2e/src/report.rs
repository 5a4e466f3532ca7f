//! Run results and the plain-text summary

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::RunSummary;
use crate::error::E2eResult;
use crate::launcher::ShardExit;

/// What happened to one shard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardOutcome {
    pub index: usize,
    pub port: u16,
    pub files: usize,
    pub iterations: Option<u32>,
    pub exit: ShardExit,
    pub duration_ms: u64,
    pub summary: RunSummary,
}

/// Result of a whole sharded run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// In shard index order
    pub shards: Vec<ShardOutcome>,
    pub summary: RunSummary,
    /// Set only when screenshots were requested and something failed
    pub screenshot_bundle: Option<PathBuf>,
}

impl RunReport {
    /// Shards whose process did not exit cleanly
    pub fn failed_shards(&self) -> impl Iterator<Item = &ShardOutcome> {
        self.shards.iter().filter(|s| !s.exit.success())
    }

    /// No failing tests and every shard exited 0
    pub fn success(&self) -> bool {
        !self.summary.has_failures() && self.failed_shards().next().is_none()
    }

    /// Process exit code for the run.
    ///
    /// Without `propagate_failures` the run always reports 0, leaving the
    /// printed summary as the only failure signal.
    pub fn exit_code(&self, propagate_failures: bool) -> i32 {
        if propagate_failures && !self.success() {
            1
        } else {
            0
        }
    }

    /// Write results as pretty JSON to `<dir>/test-results.json`
    pub fn write_json(&self, dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("test-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Failing-test payloads, the four counts, elapsed time, then the screenshot
/// bundle path if there is one
pub fn render_summary<W: Write>(report: &RunReport, out: &mut W) -> io::Result<()> {
    let summary = &report.summary;

    for failed in &summary.failed_tests {
        let pretty = serde_json::to_string_pretty(failed).unwrap_or_else(|_| failed.to_string());
        writeln!(out, "{}", pretty)?;
    }

    writeln!(out, "tests:    {}", summary.tests)?;
    writeln!(out, "passes:   {}", summary.passes)?;
    writeln!(out, "pending:  {}", summary.pending)?;
    writeln!(out, "failures: {}", summary.failures)?;
    writeln!(out, "Execution time: {} ms", report.duration_ms)?;

    if let Some(bundle) = &report.screenshot_bundle {
        writeln!(out, "Failure screenshots: {}", bundle.display())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(index: usize, exit: ShardExit) -> ShardOutcome {
        ShardOutcome {
            index,
            port: 9222 + index as u16,
            files: 1,
            iterations: None,
            exit,
            duration_ms: 10,
            summary: RunSummary::default(),
        }
    }

    fn report(summary: RunSummary, shards: Vec<ShardOutcome>) -> RunReport {
        RunReport {
            started_at: Utc::now(),
            duration_ms: 1234,
            shards,
            summary,
            screenshot_bundle: None,
        }
    }

    #[test]
    fn test_render_order() {
        let summary = RunSummary {
            tests: 8,
            passes: 7,
            pending: 0,
            failures: 1,
            failed_tests: vec![json!({"name": "x"})],
            skipped_lines: 0,
        };
        let mut r = report(summary, vec![]);
        r.screenshot_bundle = Some(PathBuf::from("/out/failure-screenshots"));

        let mut buf = Vec::new();
        render_summary(&r, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let expected = "{\n  \"name\": \"x\"\n}\ntests:    8\npasses:   7\npending:  0\nfailures: 1\nExecution time: 1234 ms\nFailure screenshots: /out/failure-screenshots\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_exit_code_policy() {
        let failing = RunSummary {
            failures: 1,
            ..Default::default()
        };
        let r = report(failing, vec![outcome(0, ShardExit::Code { code: 1 })]);
        assert_eq!(r.exit_code(false), 0);
        assert_eq!(r.exit_code(true), 1);

        let clean = report(RunSummary::default(), vec![outcome(0, ShardExit::Code { code: 0 })]);
        assert_eq!(clean.exit_code(true), 0);
    }

    #[test]
    fn test_shard_crash_counts_as_failure() {
        let r = report(
            RunSummary::default(),
            vec![
                outcome(0, ShardExit::Code { code: 0 }),
                outcome(1, ShardExit::Signaled),
            ],
        );
        assert!(!r.success());
        assert_eq!(r.failed_shards().map(|s| s.index).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let r = report(RunSummary::default(), vec![outcome(0, ShardExit::Code { code: 0 })]);
        let path = r.write_json(&dir.path().join("results")).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["shards"][0]["exit"], json!({"kind": "code", "code": 0}));
        assert_eq!(parsed["duration_ms"], json!(1234));
    }
}
