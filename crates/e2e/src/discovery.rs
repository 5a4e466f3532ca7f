//! Test file discovery

use std::fmt;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DiscoveryConfig;

/// Path to a single test source file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestFile(PathBuf);

impl TestFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for TestFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Produce the file set for a run.
///
/// An explicit pattern list wins over the directory walk and is taken as is;
/// nothing checks that its entries exist. A relative `test_dir` is walked
/// under `cwd` and the files come back relative to `cwd`, which is where the
/// children run.
pub fn discover(config: &DiscoveryConfig, cwd: &Path) -> Vec<TestFile> {
    if let Some(patterns) = config.test_file_pattern.as_deref() {
        let files = parse_pattern_list(patterns);
        debug!("Using {} explicit test file pattern(s)", files.len());
        return files;
    }

    if config.test_dir.is_absolute() || cwd.as_os_str().is_empty() {
        let files = walk_test_dir(&config.test_dir, &config.suffix);
        debug!(
            "Discovered {} test file(s) under {}",
            files.len(),
            config.test_dir.display()
        );
        return files;
    }

    let root = cwd.join(&config.test_dir);
    let files: Vec<TestFile> = walk_test_dir(&root, &config.suffix)
        .into_iter()
        .map(|file| {
            let relative = file.path().strip_prefix(cwd).ok().map(Path::to_path_buf);
            relative.map(TestFile::new).unwrap_or(file)
        })
        .collect();
    debug!("Discovered {} test file(s) under {}", files.len(), root.display());
    files
}

/// Split a comma-separated pattern list
pub fn parse_pattern_list(patterns: &str) -> Vec<TestFile> {
    patterns
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(TestFile::new)
        .collect()
}

/// Walk `root` in file-name order collecting files ending in `suffix`
pub fn walk_test_dir(root: &Path, suffix: &str) -> Vec<TestFile> {
    if !root.is_dir() {
        warn!("Test directory {} does not exist; nothing to run", root.display());
        return Vec::new();
    }

    walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(suffix))
        .map(|e| TestFile::new(e.into_path()))
        .collect()
}
