//! Run Command
//!
//! Shards the suite, launches every shard, and prints the merged results.

use std::path::PathBuf;
use anyhow::Result;
use clap::Args;
use tracing::debug;

use shardrun_e2e::{RunnerConfig, ServerType, TestRunner};

use super::SelectionArgs;
use crate::output::{print_report, OutputFormat};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Maximum shards running at once (defaults to the shard count)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Report the failure screenshot bundle path when tests fail
    #[arg(long)]
    pub failure_screenshots: bool,

    /// Exit 1 when any test failed or any shard exited non-zero
    #[arg(long)]
    pub propagate_failures: bool,

    /// Environment variable that carries each shard's port
    #[arg(long)]
    pub port_env: Option<String>,

    /// Suite runner executable
    #[arg(long)]
    pub program: Option<String>,

    /// Suite runner config file, passed via --config
    #[arg(long)]
    pub suite_config: Option<PathBuf>,

    /// Name of the build output directory (out/TARGET)
    #[arg(long)]
    pub target: Option<String>,

    /// Path to the browser binary
    #[arg(long)]
    pub chrome_binary: Option<PathBuf>,

    /// Comma separated list passed as --enable-features to the browser
    #[arg(long)]
    pub chrome_features: Option<String>,

    /// Module search paths for the suite runner (NODE_PATH)
    #[arg(long)]
    pub node_modules_path: Option<String>,

    /// Collect code coverage
    #[arg(long)]
    pub coverage: bool,

    /// Only run tests whose titles contain this string
    #[arg(long)]
    pub mocha_fgrep: Option<String>,

    /// Invert the --mocha-fgrep match
    #[arg(long)]
    pub invert: bool,

    /// Test server the children should start (hosted-mode, component-docs, none)
    #[arg(long, value_parser = parse_server_type)]
    pub test_server_type: Option<ServerType>,

    /// Prefix for the component server's docs directory under out/TARGET/gen
    #[arg(long)]
    pub component_server_base_path: Option<String>,

    /// Base of the shared resource URLs injected into component examples
    #[arg(long)]
    pub component_server_shared_resources_path: Option<String>,

    /// Page the hosted server loads for each test
    #[arg(long)]
    pub hosted_server_devtools_url: Option<String>,

    /// Base URL for e2e test resources
    #[arg(long)]
    pub hosted_server_e2e_resources_path: Option<String>,

    /// Start the suite runner under the debugger
    #[arg(long, env = "DEBUG_TEST")]
    pub inspect: bool,

    /// Echo shard output while it runs
    #[arg(long)]
    pub stream: bool,

    /// Directory for results JSON and shard logs
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    pub fn apply(self, config: &mut RunnerConfig) {
        self.selection.apply(config);

        if let Some(concurrency) = self.concurrency {
            config.sharding.concurrency = Some(concurrency);
        }
        if let Some(port_env) = self.port_env {
            config.runner.port_env = port_env;
        }
        if let Some(program) = self.program {
            config.runner.program = program;
        }
        if let Some(suite_config) = self.suite_config {
            config.runner.suite_config = Some(suite_config);
        }
        if let Some(fgrep) = self.mocha_fgrep {
            config.runner.fgrep = Some(fgrep);
        }
        config.runner.invert |= self.invert;
        config.runner.inspect |= self.inspect;
        config.runner.stream_output |= self.stream;

        let env = &mut config.environment;
        if let Some(target) = self.target {
            env.target = Some(target);
        }
        if let Some(chrome) = self.chrome_binary {
            env.chrome_binary = Some(chrome);
        }
        if let Some(features) = self.chrome_features {
            env.chrome_features = Some(features);
        }
        if let Some(node_path) = self.node_modules_path {
            env.node_modules_path = Some(node_path);
        }
        if let Some(server_type) = self.test_server_type {
            env.server_type = Some(server_type);
        }
        env.coverage |= self.coverage;

        let server = &mut config.server;
        if let Some(base_path) = self.component_server_base_path {
            server.component_server_base_path = base_path;
        }
        if let Some(shared) = self.component_server_shared_resources_path {
            server.component_server_shared_resources_path = shared;
        }
        if let Some(url) = self.hosted_server_devtools_url {
            server.hosted_server_devtools_url = url;
        }
        if let Some(resources) = self.hosted_server_e2e_resources_path {
            server.hosted_server_e2e_resources_path = resources;
        }

        config.report.failure_screenshots |= self.failure_screenshots;
        config.report.propagate_failures |= self.propagate_failures;
        if let Some(output) = self.output {
            config.report.output_dir = Some(output);
        }
    }
}

fn parse_server_type(value: &str) -> Result<ServerType, String> {
    value.parse().map_err(|e: shardrun_e2e::E2eError| e.to_string())
}

pub async fn execute(args: RunArgs, mut config: RunnerConfig, format: OutputFormat) -> Result<i32> {
    args.apply(&mut config);
    debug!("Resolved configuration: {:?}", config);

    let propagate = config.report.propagate_failures;
    let runner = TestRunner::with_config(config);
    let report = runner.run().await?;

    print_report(&report, format);
    Ok(report.exit_code(propagate))
}
