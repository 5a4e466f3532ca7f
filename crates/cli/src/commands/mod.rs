//! CLI command implementations

pub mod plan;
pub mod run;

use std::path::PathBuf;
use clap::Args;

use shardrun_e2e::RunnerConfig;

/// Options shared by every command that selects and shards test files
#[derive(Args, Debug, Default)]
pub struct SelectionArgs {
    /// Comma separated list of test files; replaces directory discovery
    #[arg(long = "test-file-pattern")]
    pub test_file_pattern: Option<String>,

    /// Same as --test-file-pattern, given positionally
    #[arg(value_name = "TEST_FILE_PATTERN", conflicts_with = "test_file_pattern")]
    pub positional_pattern: Option<String>,

    /// Directory searched for test files
    #[arg(long)]
    pub test_dir: Option<PathBuf>,

    /// File name suffix identifying test files
    #[arg(long)]
    pub suffix: Option<String>,

    /// Number of shards (parallel runners)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Run every file in every shard this many times
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Port given to shard 0; later shards count up from here
    #[arg(long)]
    pub base_port: Option<u16>,

    /// Directory the children run in, and relative paths resolve against
    #[arg(long)]
    pub cwd: Option<PathBuf>,
}

impl SelectionArgs {
    pub fn apply(self, config: &mut RunnerConfig) {
        if let Some(pattern) = self.test_file_pattern.or(self.positional_pattern) {
            config.discovery.test_file_pattern = Some(pattern);
        }
        if let Some(dir) = self.test_dir {
            config.discovery.test_dir = dir;
        }
        if let Some(suffix) = self.suffix {
            config.discovery.suffix = suffix;
        }
        if let Some(jobs) = self.jobs {
            config.sharding.jobs = jobs;
        }
        if let Some(iterations) = self.iterations {
            config.sharding.iterations = Some(iterations);
        }
        if let Some(port) = self.base_port {
            config.runner.base_port = port;
        }
        if let Some(cwd) = self.cwd {
            config.cwd = cwd;
        }
    }
}
