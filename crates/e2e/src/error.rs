//! Error types for sharded E2E runs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{name} [{}] does not exist", path.display())]
    PathNotFound { name: String, path: PathBuf },

    #[error(
        "test server type could not be inferred from test dir [{0}]; pass --test-server-type (use \"none\" if no server is needed)"
    )]
    ServerTypeUnknown(String),

    #[error("Failed to spawn shard {index} ({program}): {source}")]
    ShardSpawn {
        index: usize,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("Shard task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type E2eResult<T> = Result<T, E2eError>;
