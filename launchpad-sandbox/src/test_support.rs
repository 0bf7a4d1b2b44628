//! Scripted sandbox doubles for orchestrator tests.
//!
//! A [`ScriptedFactory`] records every call in a shared [`CallLog`] and plays
//! back canned process output and exit codes keyed by command line
//! (`"npm install"`, `"npm run start"`).

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use launchpad_core::FileSystemTree;

use crate::error::SandboxError;
use crate::process::Process;
use crate::sandbox::{Sandbox, SandboxFactory};

/// One observed call on the scripted sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxCall {
    Boot,
    Mount { files: Vec<String> },
    Spawn { command: String },
    WriteFile { path: String, contents: Vec<u8> },
    Teardown,
}

/// Shared, ordered record of sandbox calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<SandboxCall>>>);

impl CallLog {
    fn push(&self, call: SandboxCall) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<SandboxCall> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn boots(&self) -> usize {
        self.count(|call| matches!(call, SandboxCall::Boot))
    }

    /// Command lines passed to `spawn`, in call order.
    pub fn spawned(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SandboxCall::Spawn { command } => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Index of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&SandboxCall) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }

    pub fn count(&self, pred: impl Fn(&SandboxCall) -> bool) -> usize {
        self.calls().iter().filter(|call| pred(call)).count()
    }
}

/// How a scripted process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedExit {
    /// Exit with this code right after the scripted output.
    Code(i32),
    /// Exit with this code after the delay.
    After(Duration, i32),
    /// Keep running until teardown.
    Never,
    /// Exit with this code while a leftover descendant keeps the output
    /// open until teardown.
    Detached(i32),
}

/// Canned behaviour for one command line.
#[derive(Debug, Clone)]
pub struct ScriptedProcess {
    pub output: Vec<String>,
    pub exit: ScriptedExit,
}

impl ScriptedProcess {
    pub fn exits(code: i32, output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|s| s.to_string()).collect(),
            exit: ScriptedExit::Code(code),
        }
    }

    pub fn runs_forever(output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|s| s.to_string()).collect(),
            exit: ScriptedExit::Never,
        }
    }

    pub fn exits_detached(code: i32, output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|s| s.to_string()).collect(),
            exit: ScriptedExit::Detached(code),
        }
    }

    pub fn exits_after(delay: Duration, code: i32, output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|s| s.to_string()).collect(),
            exit: ScriptedExit::After(delay, code),
        }
    }
}

/// Behaviour of a scripted sandbox session.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub boot_error: Option<String>,
    pub boot_delay: Option<Duration>,
    pub mount_error: Option<String>,
    /// Commands whose spawn fails with "not found".
    pub unspawnable: Vec<String>,
    pub processes: HashMap<String, ScriptedProcess>,
}

impl Script {
    /// `npm install` exits with `install_code`; `npm run start` runs forever.
    pub fn npm(install_code: i32) -> Self {
        Self::default()
            .process(
                "npm install",
                ScriptedProcess::exits(install_code, &["added 2 packages\n"]),
            )
            .process(
                "npm run start",
                ScriptedProcess::runs_forever(&["App is live at http://localhost:3111\n"]),
            )
    }

    pub fn process(mut self, command: &str, process: ScriptedProcess) -> Self {
        self.processes.insert(command.to_string(), process);
        self
    }
}

/// Boots [`ScriptedSandbox`]es that follow a [`Script`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    script: Script,
    log: CallLog,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            log: CallLog::default(),
        }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl SandboxFactory for ScriptedFactory {
    type Sandbox = ScriptedSandbox;

    async fn boot(&self) -> Result<ScriptedSandbox, SandboxError> {
        self.log.push(SandboxCall::Boot);
        if let Some(delay) = self.script.boot_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.script.boot_error {
            return Err(SandboxError::Boot {
                reason: reason.clone(),
            });
        }
        Ok(ScriptedSandbox {
            script: self.script.clone(),
            log: self.log.clone(),
            running: Mutex::new(Vec::new()),
        })
    }
}

type Running = (mpsc::Sender<String>, Option<oneshot::Sender<i32>>);

/// Sandbox double produced by [`ScriptedFactory`].
#[derive(Debug)]
pub struct ScriptedSandbox {
    script: Script,
    log: CallLog,
    running: Mutex<Vec<Running>>,
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn mount(&self, tree: &FileSystemTree) -> Result<(), SandboxError> {
        self.log.push(SandboxCall::Mount {
            files: tree.files().into_iter().map(|(path, _)| path).collect(),
        });
        if let Some(reason) = &self.script.mount_error {
            return Err(SandboxError::Io {
                path: "/".into(),
                source: io::Error::new(io::ErrorKind::Other, reason.clone()),
            });
        }
        tree.validate()?;
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<Process, SandboxError> {
        let line = std::iter::once(command)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.log.push(SandboxCall::Spawn {
            command: line.clone(),
        });
        if self.script.unspawnable.contains(&line) {
            return Err(SandboxError::Spawn {
                command: line,
                source: io::Error::new(io::ErrorKind::NotFound, "command not found"),
            });
        }

        let scripted = self
            .script
            .processes
            .get(&line)
            .cloned()
            .unwrap_or_else(|| ScriptedProcess::exits(0, &[]));
        let (output_tx, exit_tx, process) = Process::channel(line);

        match scripted.exit {
            ScriptedExit::Never => {
                for chunk in scripted.output {
                    let _ = output_tx.send(chunk).await;
                }
                self.running
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((output_tx, Some(exit_tx)));
            }
            ScriptedExit::Detached(code) => {
                for chunk in scripted.output {
                    let _ = output_tx.send(chunk).await;
                }
                let _ = exit_tx.send(code);
                self.running
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((output_tx, None));
            }
            ScriptedExit::Code(code) => {
                tokio::spawn(async move {
                    for chunk in scripted.output {
                        let _ = output_tx.send(chunk).await;
                    }
                    drop(output_tx);
                    let _ = exit_tx.send(code);
                });
            }
            ScriptedExit::After(delay, code) => {
                tokio::spawn(async move {
                    for chunk in scripted.output {
                        let _ = output_tx.send(chunk).await;
                    }
                    tokio::time::sleep(delay).await;
                    drop(output_tx);
                    let _ = exit_tx.send(code);
                });
            }
        }
        Ok(process)
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), SandboxError> {
        self.log.push(SandboxCall::WriteFile {
            path: path.to_string(),
            contents: contents.to_vec(),
        });
        Ok(())
    }

    async fn teardown(&self) -> Result<(), SandboxError> {
        self.log.push(SandboxCall::Teardown);
        let running = std::mem::take(
            &mut *self.running.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (output_tx, exit_tx) in running {
            drop(output_tx);
            if let Some(exit_tx) = exit_tx {
                let _ = exit_tx.send(-9);
            }
        }
        Ok(())
    }
}
