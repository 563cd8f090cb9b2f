//! Error types for japa-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::EventId;

/// All errors that can arise from the local durable store and config.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encode/decode failure for a local store file.
    #[error("failed to read or write JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML serialization error (config save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on config load: includes file path and line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}; run `japa init` first")]
    ConfigNotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.japa/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// An increment must add at least one repetition.
    #[error("increment delta must be a positive integer")]
    InvalidDelta,

    #[error("no event with id {0} in the local log")]
    EventNotFound(EventId),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn json_err(path: impl Into<PathBuf>, source: serde_json::Error) -> StoreError {
    StoreError::Json {
        path: path.into(),
        source,
    }
}
