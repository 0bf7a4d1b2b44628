use std::time::Duration;

use thiserror::Error;

use launchpad_sandbox::SandboxError;

use crate::sink::SinkError;
use crate::state::Step;

/// Error surface for the launch sequence.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("display surface is not mounted; mark the readiness gate before initializing")]
    SurfaceUnbound,

    #[error("sandbox is not booted")]
    SandboxUnbound,

    #[error("launch already started (state: {state})")]
    AlreadyStarted { state: &'static str },

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("installation failed: '{command}' exited with code {code}")]
    InstallFailed { command: String, code: i32 },

    #[error("{step} step timed out after {after:?}")]
    StepTimedOut { step: Step, after: Duration },

    #[error("{step} step cancelled")]
    Cancelled { step: Step },

    #[error("output sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },
}

pub(crate) fn join_err(task: &'static str, err: tokio::task::JoinError) -> OrchestratorError {
    OrchestratorError::Join {
        task,
        reason: err.to_string(),
    }
}
