//! `launchpad up`: run the lifecycle against a local sandbox and stream output.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tokio::sync::watch;

use launchpad_core::{config, project::STARTER_PORT, LaunchConfig};
use launchpad_runtime::{
    init_tracing, Failure, LaunchOptions, LifecycleState, Orchestrator, StatusSnapshot,
    TerminalSink, Transition,
};
use launchpad_sandbox::LocalSandboxFactory;

/// Arguments for `launchpad up`.
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Sandbox root directory (created if missing, kept afterwards).
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Keep the temporary sandbox directory after exit.
    #[arg(long, conflicts_with = "dir")]
    pub keep: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    pub log_json: bool,
}

impl UpArgs {
    pub fn run(self) -> Result<()> {
        init_tracing(self.log_json);

        let config = config::load().context("failed to load launchpad config")?;
        let factory = self.factory(&config);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        let outcome = runtime.block_on(serve(factory, &config))?;

        match outcome {
            Outcome::Interrupted => {
                eprintln!("{} stopped", "■".yellow());
                Ok(())
            }
            Outcome::Failed(failure) => {
                eprintln!("{} {}", "✗".red().bold(), failure.to_string().red());
                anyhow::bail!("launch failed during the {} step", failure.step)
            }
        }
    }

    fn factory(&self, config: &LaunchConfig) -> LocalSandboxFactory {
        match self.dir.as_ref().or(config.workspace_dir.as_ref()) {
            Some(dir) => LocalSandboxFactory::at(dir.clone()),
            None => LocalSandboxFactory::new().keep(self.keep),
        }
    }
}

enum Outcome {
    Interrupted,
    Failed(Failure),
}

async fn serve(factory: LocalSandboxFactory, config: &LaunchConfig) -> Result<Outcome> {
    let sink = Arc::new(TerminalSink::stdout(config.convert_eol));
    let orch = Arc::new(Orchestrator::new(
        factory,
        sink,
        LaunchOptions::from(config),
    ));
    let reporter = tokio::spawn(report_transitions(orch.subscribe()));

    let launch = orch.launch_when_ready();
    // stdout is the display surface and is bound from here on.
    orch.gate().mark_ready();

    let outcome = tokio::select! {
        failure = orch.wait_finished() => Outcome::Failed(failure),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("received ctrl-c, tearing down sandbox");
            orch.cancel().await;
            Outcome::Interrupted
        }
    };

    match launch.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(error = %err, "launch task ended with error"),
        Err(err) => tracing::warn!(error = %err, "launch task join failure"),
    }
    reporter.abort();
    Ok(outcome)
}

/// Print every transition recorded since the last wake-up. Reading the
/// history instead of the current state keeps coalesced updates visible.
async fn report_transitions(mut rx: watch::Receiver<StatusSnapshot>) {
    let mut seen = 0;
    loop {
        let (lines, done) = {
            let snapshot = rx.borrow_and_update();
            let fresh = snapshot.transitions_after(seen);
            seen = snapshot.transitions.len();
            let done = fresh.iter().any(|t| t.state.failure().is_some());
            (transition_lines(fresh), done)
        };
        for line in lines {
            eprintln!("{line}");
        }
        if done || rx.changed().await.is_err() {
            return;
        }
    }
}

/// One status line per transition; `idle` and `failed` print nothing here.
fn transition_lines(transitions: &[Transition]) -> Vec<String> {
    transitions
        .iter()
        .filter_map(|t| match &t.state {
            LifecycleState::Idle | LifecycleState::Failed(_) => None,
            LifecycleState::Serving => Some(format!(
                "{} serving on http://localhost:{STARTER_PORT}",
                "✓".green().bold()
            )),
            other => Some(format!("{} {}", "→".cyan(), other.label())),
        })
        .collect()
}
