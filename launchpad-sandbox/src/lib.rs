//! Sandbox capability consumed by the launchpad orchestrator.
//!
//! - [`SandboxFactory`] / [`Sandbox`]: the contract (boot, mount, spawn, write, teardown)
//! - [`Process`]: a running command: ordered output chunks plus an exit code
//! - [`LocalSandbox`]: directory-backed implementation running host processes
//! - `test_support` (feature `test-support`): scripted doubles with a call log

mod error;
pub mod local;
pub mod process;
mod sandbox;
#[cfg(feature = "test-support")]
pub mod test_support;

pub use error::SandboxError;
pub use local::{LocalSandbox, LocalSandboxFactory};
pub use process::{OutputStream, Process, ProcessExit};
pub use sandbox::{Sandbox, SandboxFactory};
