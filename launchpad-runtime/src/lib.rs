//! Lifecycle orchestration: readiness gate, launch sequence, output relay.
//!
//! An [`Orchestrator`] waits for its [`ReadinessGate`], boots a sandbox,
//! mounts the project, runs the install command to a zero exit, then starts
//! the server and keeps relaying its output to an [`OutputSink`].

pub mod error;
pub mod gate;
pub mod orchestrator;
mod relay;
pub mod sink;
pub mod state;

pub use error::OrchestratorError;
pub use gate::ReadinessGate;
pub use orchestrator::{LaunchOptions, Orchestrator, INSTALL_DRAIN_GRACE};
pub use sink::{convert_eol, OutputSink, RecordingSink, SinkError, TerminalSink};
pub use state::{Failure, LifecycleState, StatusSnapshot, Step, Transition};

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
