use std::path::PathBuf;

use thiserror::Error;

use launchpad_core::TreeError;

/// Error surface for booting, mounting into, and spawning inside a sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox boot failed: {reason}")]
    Boot { reason: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed project tree: {0}")]
    MalformedTree(#[from] TreeError),

    #[error("invalid sandbox path '{path}'")]
    InvalidPath { path: String },

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exit status of '{command}' was lost before the process finished")]
    ExitLost { command: String },

    #[error("sandbox has been torn down")]
    TornDown,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SandboxError {
    SandboxError::Io {
        path: path.into(),
        source,
    }
}
