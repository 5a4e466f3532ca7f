//! Fan-in of shard logs into a [`RunSummary`]

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::events::{decode_line, TestEvent};

/// Totals across every `end` and `fail` event seen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub tests: u64,
    pub passes: u64,
    pub pending: u64,
    pub failures: u64,
    /// Descriptors from `fail` events, in the order they were read
    pub failed_tests: Vec<Value>,
    /// Lines that were not protocol events
    pub skipped_lines: u64,
}

impl RunSummary {
    pub fn absorb(&mut self, event: TestEvent) {
        match event {
            TestEvent::End(stats) => {
                self.tests = self.tests.saturating_add(stats.tests);
                self.passes = self.passes.saturating_add(stats.passes);
                self.pending = self.pending.saturating_add(stats.pending);
                self.failures = self.failures.saturating_add(stats.failures);
            }
            TestEvent::Fail(descriptor) => self.failed_tests.push(descriptor),
            TestEvent::Progress => {}
        }
    }

    /// Fold another summary into this one, appending its failures after ours.
    /// Counters saturate at `u64::MAX`.
    pub fn merge(&mut self, other: &RunSummary) {
        self.tests = self.tests.saturating_add(other.tests);
        self.passes = self.passes.saturating_add(other.passes);
        self.pending = self.pending.saturating_add(other.pending);
        self.failures = self.failures.saturating_add(other.failures);
        self.failed_tests.extend(other.failed_tests.iter().cloned());
        self.skipped_lines = self.skipped_lines.saturating_add(other.skipped_lines);
    }

    pub fn has_failures(&self) -> bool {
        self.failures > 0 || !self.failed_tests.is_empty()
    }

    /// Feed every line of `reader` through the decoder
    pub fn read_from<R: BufRead>(&mut self, reader: R) -> std::io::Result<()> {
        for line in reader.split(b'\n') {
            let line = line?;
            let line = String::from_utf8_lossy(&line);
            match decode_line(&line) {
                Some(event) => self.absorb(event),
                None => {
                    if !line.trim().is_empty() {
                        self.skipped_lines = self.skipped_lines.saturating_add(1);
                        debug!("skipped non-event line: {}", line.trim_end());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Summarise one shard log.
///
/// A log that cannot be read contributes nothing; the error is logged and
/// aggregation of other shards carries on.
pub fn aggregate_log(path: &Path) -> RunSummary {
    let mut summary = RunSummary::default();
    let result = File::open(path).and_then(|f| summary.read_from(BufReader::new(f)));
    if let Err(e) = result {
        warn!("Could not read shard log {}: {}", path.display(), e);
    }
    summary
}

/// Summarise several logs in the order given
pub fn aggregate_logs<P: AsRef<Path>>(paths: &[P]) -> RunSummary {
    let mut total = RunSummary::default();
    for path in paths {
        total.merge(&aggregate_log(path.as_ref()));
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn summary_of(text: &str) -> RunSummary {
        let mut summary = RunSummary::default();
        summary.read_from(Cursor::new(text)).unwrap();
        summary
    }

    #[test]
    fn test_two_shard_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("shard-0.log");
        let b = dir.path().join("shard-1.log");
        std::fs::write(
            &a,
            "[\"end\",{\"tests\":5,\"passes\":4,\"pending\":0,\"failures\":1}]\n[\"fail\",{\"name\":\"x\"}]\n",
        )
        .unwrap();
        std::fs::write(
            &b,
            "[\"end\",{\"tests\":3,\"passes\":3,\"pending\":0,\"failures\":0}]\n",
        )
        .unwrap();

        let summary = aggregate_logs(&[&a, &b]);
        assert_eq!(summary.tests, 8);
        assert_eq!(summary.passes, 7);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.failed_tests, vec![json!({"name": "x"})]);
    }

    #[test]
    fn test_malformed_line_does_not_stop_aggregation() {
        let summary = summary_of(
            "[\"end\",{\"tests\":2\n[\"end\",{\"tests\":2,\"passes\":2,\"pending\":0,\"failures\":0}]\n",
        );
        assert_eq!(summary.tests, 2);
        assert_eq!(summary.passes, 2);
        assert_eq!(summary.skipped_lines, 1);
    }

    #[test]
    fn test_noise_and_progress_lines() {
        let summary = summary_of(
            "Launching browser on port 9222\n\n[\"start\",{\"total\":1}]\n[\"pass\",{\"title\":\"a\"}]\n[\"end\",{\"tests\":1,\"passes\":1,\"pending\":0,\"failures\":0}]\nbye\n",
        );
        assert_eq!(summary.tests, 1);
        assert_eq!(summary.skipped_lines, 2);
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let mut bytes = b"\xff\xfe garbage\n".to_vec();
        bytes.extend_from_slice(b"[\"fail\",{\"title\":\"t\"}]\n");
        let mut summary = RunSummary::default();
        summary.read_from(Cursor::new(bytes)).unwrap();
        assert_eq!(summary.failed_tests.len(), 1);
        assert_eq!(summary.skipped_lines, 1);
    }

    #[test]
    fn test_failures_keep_shard_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..3)
            .map(|i| {
                let p = dir.path().join(format!("shard-{}.log", i));
                std::fs::write(&p, format!("[\"fail\",{{\"shard\":{}}}]\n", i)).unwrap();
                p
            })
            .collect();

        let summary = aggregate_logs(&paths);
        let shards: Vec<_> = summary.failed_tests.iter().map(|v| v["shard"].clone()).collect();
        assert_eq!(shards, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("shard-0.log");
        std::fs::write(
            &p,
            "noise\n[\"fail\",{\"n\":1}]\n[\"end\",{\"tests\":4,\"passes\":3,\"pending\":0,\"failures\":1}]\n",
        )
        .unwrap();

        assert_eq!(aggregate_logs(&[&p]), aggregate_logs(&[&p]));
    }

    #[test]
    fn test_huge_counts_saturate() {
        let line = format!(
            "[\"end\",{{\"tests\":{max},\"passes\":{max},\"pending\":0,\"failures\":1}}]\n",
            max = u64::MAX
        );
        let summary = summary_of(&line.repeat(2));
        assert_eq!(summary.tests, u64::MAX);
        assert_eq!(summary.passes, u64::MAX);
        assert_eq!(summary.failures, 2);

        let mut total = summary.clone();
        total.merge(&summary);
        assert_eq!(total.tests, u64::MAX);
        assert_eq!(total.failures, 4);
    }

    #[test]
    fn test_missing_log_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let summary = aggregate_log(&dir.path().join("gone.log"));
        assert_eq!(summary, RunSummary::default());
    }
}
