//! Shard process fan-out
//!
//! Every shard becomes one child process running the suite runner. Combined
//! stdout/stderr goes line by line into a per-shard temp file (and, when
//! streaming, to our stdout). A failing shard never stops its siblings; a
//! child is only killed when its own output can no longer be captured.

use std::ffi::OsString;
use std::fs::File;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::{E2eError, E2eResult};
use crate::shard::Shard;

/// How a shard's process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShardExit {
    Code { code: i32 },
    /// Killed by a signal; no exit code
    Signaled,
    /// The process never started
    SpawnFailed { reason: String },
    /// Started, but its output could not be captured; the process was killed
    Failed { reason: String },
}

impl ShardExit {
    pub fn success(&self) -> bool {
        matches!(self, ShardExit::Code { code: 0 })
    }
}

/// A finished shard process and its captured output
#[derive(Debug)]
pub struct ShardProcess {
    pub shard: Shard,
    pub port: u16,
    pub exit: ShardExit,
    pub duration: Duration,
    log: NamedTempFile,
}

impl ShardProcess {
    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// Copy the captured output somewhere that outlives the run
    pub fn persist_log(&self, dest: &Path) -> E2eResult<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(self.log.path(), dest)?;
        Ok(())
    }

    /// Remove the temp log
    pub fn close(self) -> E2eResult<()> {
        self.log.close()?;
        Ok(())
    }
}

/// `base_port + index`, if that still fits in a port number
pub fn shard_port(base_port: u16, index: usize) -> Option<u16> {
    u16::try_from(index).ok().and_then(|i| base_port.checked_add(i))
}

/// Builds and starts shard processes
pub struct Launcher<'a> {
    config: &'a RunnerConfig,
    /// Variables shared by every shard
    common_env: Vec<(String, OsString)>,
}

impl<'a> Launcher<'a> {
    /// Resolve everything that is the same for every shard
    pub fn new(config: &'a RunnerConfig) -> E2eResult<Self> {
        let env = &config.environment;
        let mut common_env: Vec<(String, OsString)> = Vec::new();

        if let Some(chrome) = &env.chrome_binary {
            common_env.push(("CHROME_BIN".into(), config.resolve(chrome).into_os_string()));
        }
        if let Some(features) = &env.chrome_features {
            common_env.push(("CHROME_FEATURES".into(), features.into()));
        }
        if let Some(target) = &env.target {
            common_env.push(("TARGET".into(), target.into()));
        }
        if env.coverage {
            common_env.push(("COVERAGE".into(), "1".into()));
        }
        if let Some(node_path) = config.node_path()? {
            common_env.push(("NODE_PATH".into(), node_path));
        }
        if config.report.failure_screenshots {
            common_env.push(("FAILURE_SCREENSHOTS".into(), "1".into()));
        }
        common_env.push(("TEST_SERVER_TYPE".into(), config.server_type()?.as_str().into()));
        common_env.push(("TEST_RUNNER_JSON_CONFIG".into(), config.to_json()?.into()));

        Ok(Self { config, common_env })
    }

    /// Port for the shard at `index`
    pub fn port_for(&self, index: usize) -> E2eResult<u16> {
        shard_port(self.config.runner.base_port, index).ok_or_else(|| {
            E2eError::InvalidConfig(format!(
                "base port {} leaves no room for shard {}",
                self.config.runner.base_port, index
            ))
        })
    }

    /// Arguments after the program name
    pub fn command_args(&self, shard: &Shard) -> Vec<OsString> {
        let runner = &self.config.runner;
        let mut args: Vec<OsString> = Vec::new();

        if runner.inspect {
            args.push("--inspect".into());
        }
        args.extend(runner.args.iter().map(OsString::from));
        if let Some(suite_config) = &runner.suite_config {
            args.push("--config".into());
            args.push(self.config.resolve(suite_config).into_os_string());
        }
        if let Some(fgrep) = &runner.fgrep {
            args.push("--fgrep".into());
            args.push(fgrep.into());
        }
        if runner.invert {
            args.push("--invert".into());
        }
        if !runner.file_pattern_flag.is_empty() {
            args.push(runner.file_pattern_flag.as_str().into());
        }
        args.push(shard.file_pattern().into());
        args
    }

    /// Environment for one shard, common variables included
    pub fn shard_env(&self, shard: &Shard, shard_count: usize) -> E2eResult<Vec<(String, OsString)>> {
        let mut env = self.common_env.clone();
        env.push((
            self.config.runner.port_env.clone(),
            self.port_for(shard.index)?.to_string().into(),
        ));
        env.push(("SHARD_INDEX".into(), shard.index.to_string().into()));
        env.push(("SHARD_COUNT".into(), shard_count.to_string().into()));
        env.push(("JOBS".into(), shard_count.to_string().into()));
        env.push(("TEST_PATTERNS".into(), shard.file_pattern().into()));
        if let Some(iterations) = shard.iterations {
            env.push(("ITERATIONS".into(), iterations.to_string().into()));
        }
        Ok(env)
    }

    fn build_command(&self, shard: &Shard, shard_count: usize) -> E2eResult<Command> {
        let mut cmd = Command::new(&self.config.runner.program);
        cmd.args(self.command_args(shard))
            .envs(self.shard_env(shard, shard_count)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.config.cwd.as_os_str().is_empty() {
            cmd.current_dir(&self.config.cwd);
        }
        Ok(cmd)
    }

    /// Start every shard, at most `concurrency` at a time, and wait for all
    /// of them. Results come back in shard order regardless of finish order.
    ///
    /// Errors are only returned for problems found before any child starts.
    /// Once shards are running, each one ends up with a [`ShardExit`].
    pub async fn launch_all(&self, shards: Vec<Shard>) -> E2eResult<Vec<ShardProcess>> {
        let shard_count = shards.len();
        if shard_count == 0 {
            return Ok(Vec::new());
        }
        // Fail before anything starts if the port range overflows
        self.port_for(shard_count - 1)?;

        let mut prepared = Vec::with_capacity(shard_count);
        for shard in shards {
            let cmd = self.build_command(&shard, shard_count)?;
            let port = self.port_for(shard.index)?;
            let log = tempfile::Builder::new()
                .prefix(&format!("shard-{}-", shard.index))
                .suffix(".log")
                .tempfile()?;
            let writer = log.reopen()?;
            prepared.push((shard, port, log, cmd, writer));
        }

        let concurrency = self.config.sharding.effective_concurrency(shard_count);
        info!("Launching {} shard(s), {} at a time", shard_count, concurrency);

        let permits = Arc::new(Semaphore::new(concurrency));
        let stream = self.config.runner.stream_output;
        let mut running = Vec::with_capacity(shard_count);

        for (shard, port, log, cmd, writer) in prepared {
            debug!(
                "shard {}: {} file(s) on port {}, log {}",
                shard.index,
                shard.files.len(),
                port,
                log.path().display()
            );

            let permits = Arc::clone(&permits);
            let program = self.config.runner.program.clone();
            let index = shard.index;

            let handle = tokio::spawn(async move {
                match permits.acquire_owned().await {
                    Ok(_permit) => run_shard(cmd, index, &program, stream, writer).await,
                    Err(e) => (
                        ShardExit::Failed {
                            reason: format!("worker pool closed: {}", e),
                        },
                        Duration::ZERO,
                    ),
                }
            });
            running.push((shard, port, log, handle));
        }

        let mut processes = Vec::with_capacity(shard_count);
        for (shard, port, log, handle) in running {
            let (exit, duration) = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("shard {} task ended abnormally: {}", shard.index, e);
                    (
                        ShardExit::Failed {
                            reason: e.to_string(),
                        },
                        Duration::ZERO,
                    )
                }
            };
            processes.push(ShardProcess {
                shard,
                port,
                exit,
                duration,
                log,
            });
        }
        Ok(processes)
    }
}

/// Run one shard to completion, writing its output to `log`
async fn run_shard(
    mut cmd: Command,
    index: usize,
    program: &str,
    stream: bool,
    log: File,
) -> (ShardExit, Duration) {
    let start = Instant::now();

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            let err = E2eError::ShardSpawn {
                index,
                program: program.to_string(),
                source,
            };
            error!("{}", err);
            return (
                ShardExit::SpawnFailed {
                    reason: err.to_string(),
                },
                start.elapsed(),
            );
        }
    };

    let exit = match capture_output(&mut child, index, stream, log).await {
        Ok(status) => match status.code() {
            Some(code) => ShardExit::Code { code },
            None => ShardExit::Signaled,
        },
        Err(e) => {
            error!("shard {}: could not capture output: {}", index, e);
            if let Err(e) = child.kill().await {
                warn!("shard {}: could not kill process: {}", index, e);
            }
            ShardExit::Failed {
                reason: e.to_string(),
            }
        }
    };
    let duration = start.elapsed();

    if exit.success() {
        info!("shard {} finished in {} ms", index, duration.as_millis());
    } else {
        warn!(
            "shard {} exited with {:?} after {} ms",
            index,
            exit,
            duration.as_millis()
        );
    }

    (exit, duration)
}

/// Tee the child's stdout and stderr into `log` until both close, then reap it
async fn capture_output(
    child: &mut Child,
    index: usize,
    stream: bool,
    log: File,
) -> std::io::Result<ExitStatus> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(256);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, tx.clone()));
    }
    drop(tx);

    let mut file = tokio::fs::File::from_std(log);
    while let Some(mut line) = rx.recv().await {
        if stream {
            println!("[shard {}] {}", index, String::from_utf8_lossy(&line));
        }
        line.push(b'\n');
        file.write_all(&line).await?;
    }
    file.flush().await?;

    child.wait().await
}

/// Send each newline-terminated chunk of `reader` down `tx`
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(mut line)) => {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("error reading shard output: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerType;
    use crate::discovery::TestFile;
    use std::path::PathBuf;

    fn config() -> RunnerConfig {
        let mut config = RunnerConfig::default();
        config.environment.server_type = Some(ServerType::None);
        config
    }

    fn shard(index: usize, files: &[&str]) -> Shard {
        Shard {
            index,
            files: files.iter().map(|f| TestFile::new(*f)).collect(),
            iterations: None,
        }
    }

    fn env_value<'e>(env: &'e [(String, OsString)], key: &str) -> Option<&'e OsString> {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[test]
    fn test_ports_are_offset_by_index() {
        let config = config();
        let launcher = Launcher::new(&config).unwrap();
        let ports: Vec<_> = (0..4).map(|i| launcher.port_for(i).unwrap()).collect();
        assert_eq!(ports, vec![9222, 9223, 9224, 9225]);
    }

    #[test]
    fn test_port_overflow_is_rejected() {
        let mut config = config();
        config.runner.base_port = u16::MAX - 1;
        let launcher = Launcher::new(&config).unwrap();
        assert!(launcher.port_for(1).is_ok());
        assert!(launcher.port_for(2).is_err());
    }

    #[test]
    fn test_command_args() {
        let mut config = config();
        config.cwd = PathBuf::from("/src");
        config.runner.suite_config = Some(PathBuf::from("test/e2e/.mocharc.js"));
        config.runner.fgrep = Some("Console".to_string());
        config.runner.invert = true;
        config.runner.inspect = true;
        let launcher = Launcher::new(&config).unwrap();

        let args = launcher.command_args(&shard(0, &["a_test.ts", "b_test.ts"]));
        let expected: Vec<OsString> = [
            "--inspect",
            "node_modules/.bin/mocha",
            "--reporter",
            "json-stream",
            "--config",
            "/src/test/e2e/.mocharc.js",
            "--fgrep",
            "Console",
            "--invert",
            "--spec",
            "a_test.ts,b_test.ts",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_empty_pattern_flag_passes_files_positionally() {
        let mut config = config();
        config.runner.args.clear();
        config.runner.file_pattern_flag.clear();
        let launcher = Launcher::new(&config).unwrap();
        assert_eq!(
            launcher.command_args(&shard(0, &["x_test.ts"])),
            vec![OsString::from("x_test.ts")]
        );
    }

    #[test]
    fn test_shard_env() {
        let mut config = config();
        config.environment.target = Some("Release".to_string());
        config.environment.coverage = true;
        config.report.failure_screenshots = true;
        let launcher = Launcher::new(&config).unwrap();

        let mut s = shard(2, &["a_test.ts", "b_test.ts"]);
        s.iterations = Some(3);
        let env = launcher.shard_env(&s, 3).unwrap();

        assert_eq!(env_value(&env, "TEST_PORT").unwrap(), "9224");
        assert_eq!(env_value(&env, "SHARD_INDEX").unwrap(), "2");
        assert_eq!(env_value(&env, "SHARD_COUNT").unwrap(), "3");
        assert_eq!(env_value(&env, "TEST_PATTERNS").unwrap(), "a_test.ts,b_test.ts");
        assert_eq!(env_value(&env, "ITERATIONS").unwrap(), "3");
        assert_eq!(env_value(&env, "TARGET").unwrap(), "Release");
        assert_eq!(env_value(&env, "COVERAGE").unwrap(), "1");
        assert_eq!(env_value(&env, "FAILURE_SCREENSHOTS").unwrap(), "1");
        assert_eq!(env_value(&env, "TEST_SERVER_TYPE").unwrap(), "none");
        assert!(env_value(&env, "CHROME_BIN").is_none());

        let json = env_value(&env, "TEST_RUNNER_JSON_CONFIG").unwrap();
        let parsed: RunnerConfig = serde_json::from_str(json.to_str().unwrap()).unwrap();
        assert_eq!(parsed.environment.target.as_deref(), Some("Release"));
    }

    #[test]
    fn test_custom_port_env() {
        let mut config = config();
        config.runner.port_env = "CHROME_DEBUG_PORT".to_string();
        config.runner.base_port = 4000;
        let launcher = Launcher::new(&config).unwrap();
        let env = launcher.shard_env(&shard(1, &["a"]), 2).unwrap();
        assert_eq!(env_value(&env, "CHROME_DEBUG_PORT").unwrap(), "4001");
        assert!(env_value(&env, "ITERATIONS").is_none());
    }

    #[test]
    fn test_exit_success() {
        assert!(ShardExit::Code { code: 0 }.success());
        assert!(!ShardExit::Code { code: 1 }.success());
        assert!(!ShardExit::Signaled.success());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_recorded() {
        let mut config = config();
        config.runner.program = "/nonexistent/shardrun-test-binary".to_string();
        let launcher = Launcher::new(&config).unwrap();

        let processes = launcher
            .launch_all(vec![shard(0, &["a"]), shard(1, &["b"])])
            .await
            .unwrap();
        assert_eq!(processes.len(), 2);
        for p in &processes {
            assert!(matches!(p.exit, ShardExit::SpawnFailed { .. }));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwritable_log_is_a_failed_shard() {
        let log = tempfile::NamedTempFile::new().unwrap();
        let read_only = File::open(log.path()).unwrap();

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo one; echo two; echo three"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let (exit, _) = run_shard(cmd, 0, "sh", false, read_only).await;
        assert!(matches!(exit, ShardExit::Failed { .. }), "got {:?}", exit);
        assert!(!exit.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_captured_in_log() {
        let log = tempfile::NamedTempFile::new().unwrap();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let (exit, _) = run_shard(cmd, 0, "sh", false, log.reopen().unwrap()).await;
        assert_eq!(exit, ShardExit::Code { code: 3 });

        let captured = std::fs::read_to_string(log.path()).unwrap();
        let mut lines: Vec<_> = captured.lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
    }

    #[tokio::test]
    async fn test_no_shards_launches_nothing() {
        let config = config();
        let launcher = Launcher::new(&config).unwrap();
        assert!(launcher.launch_all(Vec::new()).await.unwrap().is_empty());
    }
}
