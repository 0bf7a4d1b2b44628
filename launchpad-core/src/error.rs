//! Error types for launchpad-core.

use std::path::PathBuf;

use thiserror::Error;

/// A project descriptor that cannot be mounted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// Entry name is empty.
    #[error("empty entry name under '{parent}'")]
    EmptyName { parent: String },

    /// Entry name is `.`, `..`, or contains a path separator.
    #[error("invalid entry name '{name}' under '{parent}'")]
    InvalidName { parent: String, name: String },
}

/// All errors that can arise from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A config field holds a value the runtime cannot use.
    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Refused to overwrite an existing config file.
    #[error("config already exists at {path}")]
    AlreadyExists { path: PathBuf },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.launchpad/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
