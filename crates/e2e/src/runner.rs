//! Main test runner that orchestrates discovery, sharding, launch and aggregation

use std::path::{Path, PathBuf};
use std::time::Instant;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate_log, RunSummary};
use crate::config::RunnerConfig;
use crate::discovery::{discover, TestFile};
use crate::error::E2eResult;
use crate::launcher::{Launcher, ShardProcess};
use crate::report::{RunReport, ShardOutcome};
use crate::shard::{plan, Shard};

/// Sharded E2E test runner
pub struct TestRunner {
    config: RunnerConfig,
}

impl TestRunner {
    /// Create a runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Files this run would execute
    pub fn discover(&self) -> Vec<TestFile> {
        discover(&self.config.discovery, &self.config.cwd)
    }

    /// Shards this run would launch
    pub fn plan(&self) -> Vec<Shard> {
        plan(&self.discover(), &self.config.sharding)
    }

    /// Run every shard to completion and aggregate their event streams
    pub async fn run(&self) -> E2eResult<RunReport> {
        self.config.validate()?;

        let started_at = Utc::now();
        let start = Instant::now();

        let files = self.discover();
        let shards = plan(&files, &self.config.sharding);
        if shards.is_empty() {
            info!("No test files found; nothing to launch");
        } else {
            info!("Running {} test file(s) across {} shard(s)", files.len(), shards.len());
        }

        let launcher = Launcher::new(&self.config)?;
        let processes = launcher.launch_all(shards).await?;

        let logs_dir: Option<PathBuf> = self
            .config
            .report
            .output_dir
            .as_ref()
            .map(|dir| self.config.resolve(dir).join("logs"));
        let (outcomes, summary) = tokio::task::spawn_blocking(move || {
            collect_outcomes(processes, logs_dir.as_deref())
        })
        .await?;

        if summary.skipped_lines > 0 {
            info!("Skipped {} non-event line(s) in shard output", summary.skipped_lines);
        }

        let screenshot_bundle = (self.config.report.failure_screenshots
            && summary.has_failures())
        .then(|| self.config.screenshot_bundle_path());

        let report = RunReport {
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            shards: outcomes,
            summary,
            screenshot_bundle,
        };

        info!(
            "Test Results: {} passed, {} failed, {} pending ({} ms)",
            report.summary.passes,
            report.summary.failures,
            report.summary.pending,
            report.duration_ms
        );

        if let Some(dir) = &self.config.report.output_dir {
            report.write_json(&self.config.resolve(dir))?;
        }

        Ok(report)
    }
}

/// Aggregate every shard log in shard order, not completion order, keeping
/// a copy under `logs_dir` when set. Temp logs are removed afterwards.
fn collect_outcomes(
    processes: Vec<ShardProcess>,
    logs_dir: Option<&Path>,
) -> (Vec<ShardOutcome>, RunSummary) {
    let mut outcomes = Vec::with_capacity(processes.len());
    let mut summary = RunSummary::default();

    for process in processes {
        let index = process.shard.index;
        let shard_summary = aggregate_log(process.log_path());
        debug!(
            "shard {}: {} test(s), {} failure(s), {} skipped line(s)",
            index, shard_summary.tests, shard_summary.failures, shard_summary.skipped_lines
        );

        if let Some(dir) = logs_dir {
            let dest = dir.join(format!("shard-{}.log", index));
            if let Err(e) = process.persist_log(&dest) {
                warn!("Could not keep log for shard {}: {}", index, e);
            }
        }

        summary.merge(&shard_summary);
        outcomes.push(ShardOutcome {
            index,
            port: process.port,
            files: process.shard.files.len(),
            iterations: process.shard.iterations,
            exit: process.exit.clone(),
            duration_ms: process.duration.as_millis() as u64,
            summary: shard_summary,
        });

        if let Err(e) = process.close() {
            warn!("Could not remove temp log for shard {}: {}", index, e);
        }
    }

    (outcomes, summary)
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}
