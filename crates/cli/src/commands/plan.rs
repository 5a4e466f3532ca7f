//! Plan Command
//!
//! Discovery and sharding only; nothing is launched.

use anyhow::{anyhow, Result};
use clap::Args;

use shardrun_e2e::launcher::shard_port;
use shardrun_e2e::shard::plan;
use shardrun_e2e::{RunnerConfig, TestRunner};

use super::SelectionArgs;
use crate::output::{print_info, print_list, OutputFormat, PlannedShard};

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
}

pub fn execute(args: PlanArgs, mut config: RunnerConfig, format: OutputFormat) -> Result<i32> {
    args.selection.apply(&mut config);

    let runner = TestRunner::with_config(config);
    let files = runner.discover();
    let shards = plan(&files, &runner.config().sharding);
    let base_port = runner.config().runner.base_port;

    let planned = shards
        .iter()
        .map(|s| {
            shard_port(base_port, s.index)
                .map(|port| PlannedShard::new(s, port))
                .ok_or_else(|| anyhow!("base port {} leaves no room for shard {}", base_port, s.index))
        })
        .collect::<Result<Vec<_>>>()?;

    if matches!(format, OutputFormat::Table) {
        print_info(&format!(
            "{} test file(s) in {} shard(s)",
            files.len(),
            planned.len()
        ));
    }
    print_list(&planned, format);
    Ok(0)
}
