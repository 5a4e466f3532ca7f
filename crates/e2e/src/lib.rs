//! Shardrun E2E Runner
//!
//! Splits an end-to-end test suite across several child processes and folds
//! their results back together:
//! - Discovers test files under a directory (or takes an explicit list)
//! - Shards them round-robin, or repeats the whole set per shard
//! - Launches one suite-runner process per shard with its own port
//! - Decodes each shard's JSON event stream into a single summary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TestRunner::run                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  discover(config) -> Vec<TestFile>                          │
//! │  plan(files, sharding) -> Vec<Shard>                        │
//! │  Launcher::launch_all(shards) -> Vec<ShardProcess>          │
//! │      └── one child per shard, port = base_port + index      │
//! │  aggregate_log(shard log) -> RunSummary   (shard order)     │
//! │  RunReport -> render_summary / write_json                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod aggregate;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod launcher;
pub mod report;
pub mod runner;
pub mod shard;

pub use aggregate::RunSummary;
pub use config::{RunnerConfig, ServerType};
pub use discovery::TestFile;
pub use error::{E2eError, E2eResult};
pub use events::TestEvent;
pub use report::{render_summary, RunReport, ShardOutcome};
pub use runner::TestRunner;
pub use shard::Shard;
