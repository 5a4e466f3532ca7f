//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use shardrun_e2e::launcher::ShardExit;
use shardrun_e2e::{render_summary, RunReport, Shard, ShardOutcome};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable tables and summary
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Planned shard, before launch
#[derive(Serialize)]
pub struct PlannedShard {
    pub index: usize,
    pub port: u16,
    pub iterations: Option<u32>,
    pub files: Vec<String>,
}

impl PlannedShard {
    pub fn new(shard: &Shard, port: u16) -> Self {
        Self {
            index: shard.index,
            port,
            iterations: shard.iterations,
            files: shard.files.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl TableDisplay for PlannedShard {
    fn headers() -> Vec<&'static str> {
        vec!["Shard", "Port", "Iterations", "Files"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.index.to_string(),
            self.port.to_string(),
            self.iterations.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string()),
            self.files.join("\n"),
        ]
    }
}

impl TableDisplay for ShardOutcome {
    fn headers() -> Vec<&'static str> {
        vec!["Shard", "Port", "Files", "Tests", "Passes", "Failures", "Exit", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.index.to_string(),
            self.port.to_string(),
            self.files.to_string(),
            self.summary.tests.to_string(),
            self.summary.passes.to_string(),
            self.summary.failures.to_string(),
            exit_label(&self.exit),
            format!("{}ms", self.duration_ms),
        ]
    }
}

fn exit_label(exit: &ShardExit) -> String {
    match exit {
        ShardExit::Code { code: 0 } => "✓ 0".to_string(),
        ShardExit::Code { code } => format!("✗ {}", code),
        ShardExit::Signaled => "✗ signal".to_string(),
        ShardExit::SpawnFailed { .. } => "✗ not started".to_string(),
        ShardExit::Failed { .. } => "✗ aborted".to_string(),
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No items found.");
                return;
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
    }
}

/// Print a finished run
pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_list(&report.shards, format);

            println!("{}", "*".repeat(100));
            let rendered = {
                let mut out = std::io::stdout().lock();
                render_summary(report, &mut out)
            };
            if let Err(e) = rendered {
                print_error(&format!("Failed to write summary: {}", e));
            }
            println!("{}", "*".repeat(100));

            if report.success() {
                print_success("All shards passed");
            } else {
                let failed: Vec<_> = report.failed_shards().map(|s| s.index.to_string()).collect();
                if !failed.is_empty() {
                    print_warning(&format!("Shards exited non-zero: {}", failed.join(", ")));
                }
                print_error("ERRORS DETECTED");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✅".green(), message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "❌".red(), message.red().bold());
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("{}  {}", "⚠️".yellow(), message.yellow());
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardrun_e2e::{RunSummary, TestFile};

    #[test]
    fn test_planned_shard_row() {
        let shard = Shard {
            index: 1,
            files: vec![TestFile::new("a_test.ts"), TestFile::new("b_test.ts")],
            iterations: None,
        };
        let row = PlannedShard::new(&shard, 9223).row();
        assert_eq!(row, vec!["1", "9223", "-", "a_test.ts\nb_test.ts"]);
    }

    #[test]
    fn test_outcome_row() {
        let outcome = ShardOutcome {
            index: 0,
            port: 9222,
            files: 3,
            iterations: None,
            exit: ShardExit::Code { code: 2 },
            duration_ms: 1500,
            summary: RunSummary {
                tests: 3,
                passes: 2,
                failures: 1,
                ..Default::default()
            },
        };
        assert_eq!(
            outcome.row(),
            vec!["0", "9222", "3", "3", "2", "1", "✗ 2", "1500ms"]
        );
        assert_eq!(ShardOutcome::headers().len(), outcome.row().len());
    }
}
