use std::path::Path;

use async_trait::async_trait;

use launchpad_core::FileSystemTree;

use crate::error::SandboxError;
use crate::process::Process;

/// Produces a booted [`Sandbox`]. Callers boot at most once per session.
#[async_trait]
pub trait SandboxFactory: Send + Sync {
    type Sandbox: Sandbox + 'static;

    async fn boot(&self) -> Result<Self::Sandbox, SandboxError>;
}

/// A booted execution environment with its own filesystem and processes.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Write `tree` into the sandbox filesystem, relative to its root.
    async fn mount(&self, tree: &FileSystemTree) -> Result<(), SandboxError>;

    /// Start `command` with `args` inside the sandbox.
    async fn spawn(&self, command: &str, args: &[String]) -> Result<Process, SandboxError>;

    /// Write a single file; `path` is relative to the sandbox root.
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), SandboxError>;

    /// Stop every process spawned by this sandbox.
    async fn teardown(&self) -> Result<(), SandboxError>;

    /// Host directory backing the sandbox filesystem, when there is one.
    fn root(&self) -> Option<&Path> {
        None
    }
}
