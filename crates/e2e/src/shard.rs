//! Partitioning of the file set into shards

use serde::{Deserialize, Serialize};

use crate::config::ShardingConfig;
use crate::discovery::TestFile;

/// Files assigned to one child process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub index: usize,
    pub files: Vec<TestFile>,
    /// Set in repeat-all mode; the child repeats its files this many times
    pub iterations: Option<u32>,
}

impl Shard {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Comma-joined file list handed to the suite runner
    pub fn file_pattern(&self) -> String {
        self.files
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Round-robin split: `files[i]` goes to shard `i % chunk_count`.
///
/// Shards left empty are dropped, so at most `min(chunk_count, files.len())`
/// come back. Indices stay dense (`0..len`).
pub fn shard(files: &[TestFile], chunk_count: usize) -> Vec<Shard> {
    let chunk_count = chunk_count.max(1);
    let mut buckets: Vec<Vec<TestFile>> = vec![Vec::new(); chunk_count];

    for (i, file) in files.iter().enumerate() {
        buckets[i % chunk_count].push(file.clone());
    }

    buckets
        .into_iter()
        .filter(|b| !b.is_empty())
        .enumerate()
        .map(|(index, files)| Shard {
            index,
            files,
            iterations: None,
        })
        .collect()
}

/// Repeat-all split: `chunk_count` shards, each with every file
pub fn shard_iterations(files: &[TestFile], chunk_count: usize, iterations: u32) -> Vec<Shard> {
    if files.is_empty() {
        return Vec::new();
    }

    (0..chunk_count.max(1))
        .map(|index| Shard {
            index,
            files: files.to_vec(),
            iterations: Some(iterations),
        })
        .collect()
}

/// Pick the sharding mode from config: an iteration count above one selects
/// repeat-all, anything else round-robin
pub fn plan(files: &[TestFile], config: &ShardingConfig) -> Vec<Shard> {
    match config.iterations {
        Some(n) if n > 1 => shard_iterations(files, config.jobs, n),
        _ => shard(files, config.jobs),
    }
}
