//! Directory-backed sandbox running host processes.
//!
//! The sandbox root is either a caller-supplied directory or a fresh temporary
//! directory that is removed when the sandbox is dropped. Every process runs
//! with the root as its working directory, stdin closed, and stdout/stderr
//! merged into one ordered output stream. Each child leads its own process
//! group; teardown and drop kill every group, descendants included.
//!
//! Files are written atomically: `<file>.launchpad.tmp` then `rename`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use launchpad_core::FileSystemTree;

use crate::error::{io_err, SandboxError};
use crate::process::{exit_code, Process, Utf8Decoder};
use crate::sandbox::{Sandbox, SandboxFactory};

const READ_CHUNK: usize = 8 * 1024;

/// Boots a [`LocalSandbox`].
#[derive(Debug, Clone, Default)]
pub struct LocalSandboxFactory {
    root: Option<PathBuf>,
    keep: bool,
}

impl LocalSandboxFactory {
    /// Sandbox in a fresh temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sandbox rooted at `root`, created if missing. Never deleted.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            keep: true,
        }
    }

    /// Keep a temporary root on disk after the sandbox is dropped.
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

#[async_trait]
impl SandboxFactory for LocalSandboxFactory {
    type Sandbox = LocalSandbox;

    async fn boot(&self) -> Result<LocalSandbox, SandboxError> {
        let (root, temp) = match &self.root {
            Some(root) => {
                if root.exists() && !root.is_dir() {
                    return Err(SandboxError::Boot {
                        reason: format!("{} exists and is not a directory", root.display()),
                    });
                }
                tokio::fs::create_dir_all(root)
                    .await
                    .map_err(|e| io_err(root, e))?;
                let root = tokio::fs::canonicalize(root)
                    .await
                    .map_err(|e| io_err(root, e))?;
                (root, None)
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("launchpad-")
                    .disable_cleanup(self.keep)
                    .tempdir()
                    .map_err(|e| SandboxError::Boot {
                        reason: format!("cannot create temporary root: {e}"),
                    })?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };

        tracing::info!(root = %root.display(), "sandbox booted");
        let (shutdown, _) = watch::channel(false);
        Ok(LocalSandbox {
            root,
            _temp: temp,
            shutdown,
            groups: Mutex::new(Vec::new()),
        })
    }
}

/// A booted directory-backed sandbox.
#[derive(Debug)]
pub struct LocalSandbox {
    root: PathBuf,
    _temp: Option<TempDir>,
    shutdown: watch::Sender<bool>,
    /// Process group ids of every spawned child.
    groups: Mutex<Vec<u32>>,
}

impl LocalSandbox {
    /// Resolve a sandbox-relative path, rejecting anything that escapes the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let relative = path.trim_start_matches('/');
        let mut resolved = self.root.clone();
        for part in relative.split('/') {
            if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
                return Err(SandboxError::InvalidPath {
                    path: path.to_string(),
                });
            }
            resolved.push(part);
        }
        Ok(resolved)
    }

    /// SIGKILL every process group this sandbox spawned. Returns how many
    /// groups were still alive.
    fn kill_groups(&self) -> usize {
        let groups = std::mem::take(
            &mut *self.groups.lock().unwrap_or_else(PoisonError::into_inner),
        );
        groups
            .into_iter()
            .filter(|&pgid| match kill_group(pgid) {
                Ok(()) => true,
                Err(err) if err.raw_os_error() == Some(ESRCH) => false,
                Err(err) => {
                    tracing::warn!(pgid, error = %err, "failed to kill process group");
                    false
                }
            })
            .count()
    }
}

impl Drop for LocalSandbox {
    fn drop(&mut self) {
        self.kill_groups();
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn mount(&self, tree: &FileSystemTree) -> Result<(), SandboxError> {
        tree.validate()?;
        for dir in tree.directories() {
            let path = self.resolve(&dir)?;
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| io_err(&path, e))?;
        }
        let files = tree.files();
        for (relative, contents) in &files {
            write_atomic(&self.resolve(relative)?, contents.as_bytes()).await?;
        }
        tracing::debug!(files = files.len(), root = %self.root.display(), "project mounted");
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<Process, SandboxError> {
        if *self.shutdown.borrow() {
            return Err(SandboxError::TornDown);
        }
        let command_line = display_command(command, args);
        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so teardown reaches every descendant.
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let pid = child.id();
        if let Some(pid) = pid {
            self.groups
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(pid);
        }
        let (output_tx, exit_tx, process) = Process::channel(command_line.clone());
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, output_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, output_tx));
        }

        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = stop_requested(&mut shutdown) => None,
            };
            let status = match finished {
                Some(status) => status,
                None => {
                    if let Err(err) = child.kill().await {
                        tracing::debug!(command = %command_line, error = %err, "kill after group signal failed");
                    }
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => exit_code(status),
                Err(err) => {
                    tracing::warn!(command = %command_line, error = %err, "failed to wait for process");
                    -1
                }
            };
            tracing::debug!(command = %command_line, code, "process exited");
            let _ = exit_tx.send(code);
        });

        tracing::debug!(command = %process.command(), pid = ?pid, "process spawned");
        Ok(process)
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), SandboxError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        write_atomic(&target, contents).await
    }

    async fn teardown(&self) -> Result<(), SandboxError> {
        self.shutdown.send_replace(true);
        let killed = self.kill_groups();
        tracing::info!(root = %self.root.display(), groups = killed, "sandbox torn down");
        Ok(())
    }

    fn root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

#[cfg(unix)]
const ESRCH: i32 = libc::ESRCH;
#[cfg(not(unix))]
const ESRCH: i32 = 3;

#[cfg(unix)]
fn kill_group(pgid: u32) -> std::io::Result<()> {
    let pgid = i32::try_from(pgid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> std::io::Result<()> {
    Ok(())
}

/// Resolves once teardown is requested or the sandbox is dropped.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), SandboxError> {
    let tmp = PathBuf::from(format!("{}.launchpad.tmp", path.display()));
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| io_err(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_err(path, e))
}

async fn pump<R>(mut reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut decoder = Utf8Decoder::default();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() && tx.send(text).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "process output read failed");
                break;
            }
        }
    }
    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = tx.send(tail).await;
    }
}

fn display_command(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
