//! Runner configuration
//!
//! A single [`RunnerConfig`] is built at startup (file defaults, then CLI
//! overrides) and passed by reference into every pipeline stage.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// Top-level runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Working directory children are started in; relative paths resolve here
    pub cwd: PathBuf,

    /// Test file discovery
    pub discovery: DiscoveryConfig,

    /// Shard and worker counts
    pub sharding: ShardingConfig,

    /// Underlying suite runner invocation
    pub runner: SuiteRunnerConfig,

    /// Values exported to the children's environment
    pub environment: EnvironmentConfig,

    /// Test server paths and URLs, read by the children from the JSON config
    pub server: ServerConfig,

    /// Summary and artifact output
    pub report: ReportConfig,
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directory walked for test files
    pub test_dir: PathBuf,

    /// File name suffix identifying a test file
    pub suffix: String,

    /// Explicit comma-separated file list; replaces the directory walk
    pub test_file_pattern: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            test_dir: PathBuf::from("test/e2e"),
            suffix: "_test.ts".to_string(),
            test_file_pattern: None,
        }
    }
}

/// Sharding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    /// Number of shards
    pub jobs: usize,

    /// Maximum shards running at once (None = all of them)
    pub concurrency: Option<usize>,

    /// Repeat-all mode: every shard runs every file this many times
    pub iterations: Option<u32>,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            concurrency: None,
            iterations: None,
        }
    }
}

impl ShardingConfig {
    /// Worker pool size for a run with `shard_count` shards
    pub fn effective_concurrency(&self, shard_count: usize) -> usize {
        self.concurrency
            .unwrap_or(shard_count)
            .min(shard_count.max(1))
            .max(1)
    }
}

/// How each shard's child process is invoked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteRunnerConfig {
    /// Executable started for every shard
    pub program: String,

    /// Fixed arguments passed before the shard-specific ones
    pub args: Vec<String>,

    /// Flag that precedes the comma-joined file list
    pub file_pattern_flag: String,

    /// Suite config file handed to the runner via `--config`
    pub suite_config: Option<PathBuf>,

    /// Only run tests whose titles contain this string
    pub fgrep: Option<String>,

    /// Invert the `fgrep` match
    pub invert: bool,

    /// Start node with `--inspect`
    pub inspect: bool,

    /// Port of shard 0; shard N gets `base_port + N`
    pub base_port: u16,

    /// Environment variable carrying the shard's port
    pub port_env: String,

    /// Echo child output to our stdout as well as the shard log
    pub stream_output: bool,
}

impl Default for SuiteRunnerConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: vec![
                "node_modules/.bin/mocha".to_string(),
                "--reporter".to_string(),
                "json-stream".to_string(),
            ],
            file_pattern_flag: "--spec".to_string(),
            suite_config: None,
            fgrep: None,
            invert: false,
            inspect: false,
            base_port: 9222,
            port_env: "TEST_PORT".to_string(),
            stream_output: false,
        }
    }
}

/// Values forwarded to every child through environment variables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Build output directory name (`out/<target>`)
    pub target: Option<String>,

    /// Browser binary driven by the tests
    pub chrome_binary: Option<PathBuf>,

    /// Comma-separated browser feature flags
    pub chrome_features: Option<String>,

    /// Extra module search paths, `:`-separated (`;` on Windows)
    pub node_modules_path: Option<String>,

    /// Ask the children to collect coverage
    pub coverage: bool,

    /// Test server flavour; inferred from the test dir when unset
    pub server_type: Option<ServerType>,
}

/// Where the test servers find their content.
///
/// Nothing here is interpreted by the runner; the children read it from
/// `TEST_RUNNER_JSON_CONFIG`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Prefix inserted before `front_end/ui/components/docs` under `out/<target>/gen`
    pub component_server_base_path: String,

    /// Base of the shared resource URLs injected into component examples
    pub component_server_shared_resources_path: String,

    /// Page the hosted server loads for each test
    pub hosted_server_devtools_url: String,

    /// Base URL for e2e test resources
    pub hosted_server_e2e_resources_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            component_server_base_path: String::new(),
            component_server_shared_resources_path: "/".to_string(),
            hosted_server_devtools_url: "front_end/devtools_app.html".to_string(),
            hosted_server_e2e_resources_path: "/test/e2e/resources".to_string(),
        }
    }
}

/// Reporting configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Report where failure screenshots are bundled
    pub failure_screenshots: bool,

    /// Exit non-zero when any test failed or any shard exited non-zero
    pub propagate_failures: bool,

    /// Where results JSON and shard logs are kept (None = nothing kept)
    pub output_dir: Option<PathBuf>,
}

/// Kind of test server the children should bring up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerType {
    HostedMode,
    ComponentDocs,
    None,
}

impl ServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::HostedMode => "hosted-mode",
            ServerType::ComponentDocs => "component-docs",
            ServerType::None => "none",
        }
    }

    /// Guess the server type from the test directory path
    pub fn infer(test_dir: &Path) -> Option<Self> {
        let dir = test_dir.to_string_lossy();
        if dir.contains("e2e") {
            Some(ServerType::HostedMode)
        } else if dir.contains("interactions") {
            Some(ServerType::ComponentDocs)
        } else {
            None
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hosted-mode" => Ok(ServerType::HostedMode),
            "component-docs" => Ok(ServerType::ComponentDocs),
            "none" => Ok(ServerType::None),
            other => Err(E2eError::InvalidConfig(format!(
                "unknown test server type '{}' (expected hosted-mode, component-docs or none)",
                other
            ))),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve a possibly-relative path against `cwd`
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Build output directory `<cwd>/out/<target>`, when a target is set
    pub fn target_dir(&self) -> Option<PathBuf> {
        self.environment
            .target
            .as_ref()
            .map(|target| self.cwd.join("out").join(target))
    }

    /// Explicit server type, or the one implied by the test directory
    pub fn server_type(&self) -> E2eResult<ServerType> {
        if let Some(server_type) = self.environment.server_type {
            return Ok(server_type);
        }
        ServerType::infer(&self.discovery.test_dir).ok_or_else(|| {
            E2eError::ServerTypeUnknown(self.discovery.test_dir.display().to_string())
        })
    }

    /// `NODE_PATH` value with every entry made absolute and checked to exist
    pub fn node_path(&self) -> E2eResult<Option<OsString>> {
        let Some(input) = self.environment.node_modules_path.as_deref() else {
            return Ok(None);
        };

        let delimiter = if cfg!(windows) { ';' } else { ':' };
        let mut resolved = Vec::new();
        for entry in input.split(delimiter).filter(|e| !e.is_empty()) {
            let path = self.resolve(Path::new(entry));
            if !path.exists() {
                return Err(E2eError::PathNotFound {
                    name: "node-modules-path".to_string(),
                    path,
                });
            }
            resolved.push(path);
        }

        Ok(Some(std::env::join_paths(resolved).map_err(|e| {
            E2eError::InvalidConfig(format!("node-modules-path: {}", e))
        })?))
    }

    /// Check paths the children depend on before anything is launched
    pub fn validate(&self) -> E2eResult<()> {
        if self.sharding.jobs == 0 {
            return Err(E2eError::InvalidConfig("jobs must be at least 1".to_string()));
        }
        if self.sharding.concurrency == Some(0) {
            return Err(E2eError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if let Some(path) = self.target_dir() {
            if !path.is_dir() {
                return Err(E2eError::PathNotFound {
                    name: format!(
                        "target out/{}",
                        self.environment.target.as_deref().unwrap_or_default()
                    ),
                    path,
                });
            }
        }
        if let Some(suite_config) = &self.runner.suite_config {
            let path = self.resolve(suite_config);
            if !path.exists() {
                return Err(E2eError::PathNotFound {
                    name: "suite config".to_string(),
                    path,
                });
            }
        }
        if let Some(chrome) = &self.environment.chrome_binary {
            let path = self.resolve(chrome);
            if !path.is_file() {
                tracing::error!("Chrome binary path {} is not valid", path.display());
            }
        }
        self.node_path()?;
        self.server_type()?;
        Ok(())
    }

    /// Path reported for the failure screenshot bundle
    pub fn screenshot_bundle_path(&self) -> PathBuf {
        let base = self
            .report
            .output_dir
            .as_ref()
            .map(|dir| self.resolve(dir))
            .unwrap_or_else(|| self.cwd.clone());
        base.join("failure-screenshots")
    }

    /// Whole config as JSON, exported to children as `TEST_RUNNER_JSON_CONFIG`
    pub fn to_json(&self) -> E2eResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
