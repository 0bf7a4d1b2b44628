//! Launch sequence: boot → mount → install → run.
//!
//! Each step runs only after the previous one succeeded; the first error
//! aborts the rest of the sequence and moves the lifecycle to `Failed`.
//! Every suspension point honours cancellation and, for boot and install,
//! an optional deadline.
//!
//! Install output is relayed and awaited (exit code, then a bounded drain). Server
//! output is relayed by a supervised background task that reports the
//! server's end through the lifecycle state.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;

use launchpad_core::{project::starter_project, CommandSpec, FileSystemTree, LaunchConfig};
use launchpad_sandbox::{Sandbox, SandboxFactory};

use crate::error::{join_err, OrchestratorError};
use crate::gate::ReadinessGate;
use crate::relay::{relay, supervise_server};
use crate::sink::OutputSink;
use crate::state::{Failure, LifecycleState, StateMachine, StatusSnapshot, Step};

/// How long install output may keep flowing after the install process exits.
pub const INSTALL_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Commands and deadlines for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub install: CommandSpec,
    pub run: CommandSpec,
    pub boot_timeout: Option<Duration>,
    pub install_timeout: Option<Duration>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self::from(&LaunchConfig::default())
    }
}

impl From<&LaunchConfig> for LaunchOptions {
    fn from(config: &LaunchConfig) -> Self {
        Self {
            install: config.install.clone(),
            run: config.run.clone(),
            boot_timeout: config.boot_timeout(),
            install_timeout: config.install_timeout(),
        }
    }
}

/// Drives one sandbox from boot to a serving project.
pub struct Orchestrator<F: SandboxFactory> {
    factory: F,
    project: FileSystemTree,
    sink: Arc<dyn OutputSink>,
    options: LaunchOptions,
    gate: Arc<ReadinessGate>,
    sandbox: OnceCell<F::Sandbox>,
    state: Arc<StateMachine>,
    cancel: watch::Sender<bool>,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl<F: SandboxFactory> Orchestrator<F> {
    /// Orchestrator for the starter project.
    pub fn new(factory: F, sink: Arc<dyn OutputSink>, options: LaunchOptions) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            factory,
            project: starter_project(),
            sink,
            options,
            gate: Arc::new(ReadinessGate::new()),
            sandbox: OnceCell::new(),
            state: Arc::new(StateMachine::new()),
            cancel,
            server: Mutex::new(None),
        }
    }

    /// Replace the project descriptor mounted at boot.
    pub fn with_project(mut self, project: FileSystemTree) -> Self {
        self.project = project;
        self
    }

    /// Gate the embedding layer marks once the display surface exists.
    pub fn gate(&self) -> Arc<ReadinessGate> {
        Arc::clone(&self.gate)
    }

    pub fn state(&self) -> LifecycleState {
        self.state.current()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.state.subscribe()
    }

    /// Run the whole launch sequence once.
    ///
    /// Fails fast with [`OrchestratorError::SurfaceUnbound`] before the gate
    /// is marked, and with [`OrchestratorError::AlreadyStarted`] on any call
    /// after the first. Returns once the server process has been spawned.
    pub async fn initialize(&self) -> Result<(), OrchestratorError> {
        if !self.gate.is_ready() {
            tracing::warn!("initialize called before the display surface was ready");
            return Err(OrchestratorError::SurfaceUnbound);
        }
        if *self.cancel.borrow() {
            return Err(OrchestratorError::Cancelled { step: Step::Boot });
        }
        self.state.begin()?;

        match self.run_sequence().await {
            Ok(()) => Ok(()),
            Err(err) => {
                let step = self.state.current().step().unwrap_or(Step::Boot);
                if self.state.fail(step, err.to_string()) {
                    tracing::error!(step = %step, error = %err, "launch sequence failed");
                }
                if matches!(err, OrchestratorError::StepTimedOut { .. }) {
                    self.teardown().await;
                }
                Err(err)
            }
        }
    }

    /// Spawn a task that waits for the gate, then calls [`initialize`](Self::initialize).
    pub fn launch_when_ready(self: &Arc<Self>) -> JoinHandle<Result<(), OrchestratorError>>
    where
        F: 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut cancel = this.cancel.subscribe();
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => Err(OrchestratorError::Cancelled { step: Step::Boot }),
                _ = this.gate.wait_ready() => this.initialize().await,
            }
        })
    }

    /// Write one file into the booted sandbox.
    pub async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), OrchestratorError> {
        self.sandbox()?.write_file(path, contents).await?;
        tracing::debug!(path, bytes = contents.len(), "file written");
        Ok(())
    }

    /// Abort the sequence and tear down a booted sandbox.
    pub async fn cancel(&self) {
        if self.cancel.send_replace(true) {
            return;
        }
        let step = self.state.current().step().unwrap_or(Step::Boot);
        if self.state.fail(step, "cancelled") {
            tracing::info!(step = %step, "launch cancelled");
        }
        self.teardown().await;
    }

    /// Resolve with the failure that ended the lifecycle.
    pub async fn wait_finished(&self) -> Failure {
        let mut rx = self.state.subscribe();
        let failure = match rx.wait_for(|s| s.state.failure().is_some()).await {
            Ok(snapshot) => snapshot.state.failure().cloned(),
            Err(_) => None,
        };
        failure.unwrap_or_else(|| Failure {
            step: Step::Serve,
            message: "lifecycle state channel closed".to_string(),
        })
    }

    async fn run_sequence(&self) -> Result<(), OrchestratorError> {
        self.sink.open()?;

        let booted = self
            .guard(Step::Boot, self.options.boot_timeout, async {
                Ok::<_, OrchestratorError>(self.factory.boot().await?)
            })
            .await?;
        if self.sandbox.set(booted).is_err() {
            return Err(OrchestratorError::AlreadyStarted { state: "booting" });
        }
        let sandbox = self.sandbox()?;
        self.guard(Step::Boot, None, async {
            Ok::<_, OrchestratorError>(sandbox.mount(&self.project).await?)
        })
        .await?;
        tracing::info!(files = self.project.files().len(), "project mounted");

        self.state.advance(LifecycleState::Installing);
        self.install().await?;

        self.state.advance(LifecycleState::Starting);
        self.start_server().await?;

        self.state.advance(LifecycleState::Serving);
        Ok(())
    }

    async fn install(&self) -> Result<(), OrchestratorError> {
        let sandbox = self.sandbox()?;
        let cmd = &self.options.install;
        let process = self
            .guard(Step::Install, None, async {
                Ok::<_, OrchestratorError>(sandbox.spawn(&cmd.program, &cmd.args).await?)
            })
            .await?;
        let command = process.command().to_string();
        tracing::info!(command = %command, "installing dependencies");

        let (output, exit) = process.into_parts();
        let mut relay_task = tokio::spawn(relay(output, Arc::clone(&self.sink)));
        let code = match self
            .guard(Step::Install, self.options.install_timeout, async {
                Ok::<_, OrchestratorError>(exit.wait().await?)
            })
            .await
        {
            Ok(code) => code,
            Err(err) => {
                relay_task.abort();
                return Err(err);
            }
        };

        // A background descendant may keep the pipe open after exit; bound the
        // drain and judge the exit code regardless.
        let drained = self
            .guard(Step::Install, None, async {
                match tokio::time::timeout(INSTALL_DRAIN_GRACE, &mut relay_task).await {
                    Ok(joined) => {
                        let relayed = joined.map_err(|e| join_err("install relay", e))?;
                        Ok::<_, OrchestratorError>(Some(relayed?))
                    }
                    Err(_) => Ok(None),
                }
            })
            .await;
        match drained {
            Ok(Some(chunks)) => {
                tracing::info!(command = %command, code, chunks, "install finished");
            }
            Ok(None) => {
                relay_task.abort();
                tracing::warn!(
                    command = %command,
                    code,
                    grace = ?INSTALL_DRAIN_GRACE,
                    "install output still open after exit; detaching relay"
                );
            }
            Err(err) => {
                relay_task.abort();
                return Err(err);
            }
        }

        if code != 0 {
            return Err(OrchestratorError::InstallFailed { command, code });
        }
        Ok(())
    }

    async fn start_server(&self) -> Result<(), OrchestratorError> {
        let sandbox = self.sandbox()?;
        let cmd = &self.options.run;
        let process = self
            .guard(Step::Start, None, async {
                Ok::<_, OrchestratorError>(sandbox.spawn(&cmd.program, &cmd.args).await?)
            })
            .await?;
        tracing::info!(command = %process.command(), "server process started");

        let handle = tokio::spawn(supervise_server(
            process,
            Arc::clone(&self.sink),
            Arc::clone(&self.state),
        ));
        *self.server.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn sandbox(&self) -> Result<&F::Sandbox, OrchestratorError> {
        self.sandbox.get().ok_or(OrchestratorError::SandboxUnbound)
    }

    /// Run `fut` unless cancellation or the optional deadline comes first.
    async fn guard<T, Fut>(
        &self,
        step: Step,
        deadline: Option<Duration>,
        fut: Fut,
    ) -> Result<T, OrchestratorError>
    where
        Fut: Future<Output = Result<T, OrchestratorError>>,
    {
        let mut cancel = self.cancel.subscribe();
        let bounded = async {
            match deadline {
                Some(after) => match tokio::time::timeout(after, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(OrchestratorError::StepTimedOut { step, after }),
                },
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => Err(OrchestratorError::Cancelled { step }),
            result = bounded => result,
        }
    }

    async fn teardown(&self) {
        let server = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = server {
            handle.abort();
        }
        if let Some(sandbox) = self.sandbox.get() {
            if let Err(err) = sandbox.teardown().await {
                tracing::warn!(error = %err, "sandbox teardown failed");
            }
        }
    }
}

impl<F: SandboxFactory> Drop for Orchestrator<F> {
    fn drop(&mut self) {
        let server = self
            .server
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = server {
            handle.abort();
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancelled| *cancelled).await;
}
