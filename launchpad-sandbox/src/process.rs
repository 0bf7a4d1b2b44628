//! Handle to a command running inside a sandbox.
//!
//! A [`Process`] splits into an [`OutputStream`] (text chunks in the order the
//! command produced them) and a [`ProcessExit`] future. Implementations build
//! one with [`Process::channel`] and feed the returned senders.

use tokio::sync::{mpsc, oneshot};

use crate::error::SandboxError;

/// Chunks buffered between a process and whoever relays its output.
pub const OUTPUT_BUFFER: usize = 256;

/// A running command: output plus exit code.
#[derive(Debug)]
pub struct Process {
    command: String,
    output: mpsc::Receiver<String>,
    exit: oneshot::Receiver<i32>,
}

impl Process {
    /// Create a process handle and the senders that drive it.
    ///
    /// Dropping every output sender ends the stream; sending on the exit
    /// sender resolves [`ProcessExit::wait`].
    pub fn channel(command: impl Into<String>) -> (mpsc::Sender<String>, oneshot::Sender<i32>, Self) {
        let (output_tx, output) = mpsc::channel(OUTPUT_BUFFER);
        let (exit_tx, exit) = oneshot::channel();
        let process = Self {
            command: command.into(),
            output,
            exit,
        };
        (output_tx, exit_tx, process)
    }

    /// Display form of the command line, e.g. `npm run start`.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn into_parts(self) -> (OutputStream, ProcessExit) {
        (
            OutputStream {
                rx: self.output,
            },
            ProcessExit {
                command: self.command,
                rx: self.exit,
            },
        )
    }
}

/// Ordered text output of a process.
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::Receiver<String>,
}

impl OutputStream {
    /// Next chunk, or `None` once the process closed its output.
    pub async fn next_chunk(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Resolves to the process exit code.
#[derive(Debug)]
pub struct ProcessExit {
    command: String,
    rx: oneshot::Receiver<i32>,
}

impl ProcessExit {
    pub async fn wait(self) -> Result<i32, SandboxError> {
        self.rx
            .await
            .map_err(|_| SandboxError::ExitLost {
                command: self.command,
            })
    }
}

/// Map a host exit status to a code. Signal deaths become `-signal`.
pub(crate) fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Decodes a byte stream into text without splitting multi-byte characters
/// across chunk boundaries.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Append `bytes` and return every complete character decoded so far.
    /// Invalid sequences become U+FFFD; an incomplete tail is held back.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is left at end of stream.
    pub(crate) fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_holds_back_split_multibyte_character() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "ok 🥳".as_bytes();
        let (head, tail) = bytes.split_at(bytes.len() - 2);

        assert_eq!(decoder.push(head), "ok ");
        assert_eq!(decoder.push(tail), "🥳");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes_and_continues() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn decoder_finish_flushes_truncated_tail_lossily() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[0xF0, 0x9F]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[tokio::test]
    async fn exit_wait_reports_lost_status_when_sender_dropped() {
        let (output_tx, exit_tx, process) = Process::channel("npm install");
        drop(output_tx);
        drop(exit_tx);
        let (mut output, exit) = process.into_parts();

        assert!(output.next_chunk().await.is_none());
        let err = exit.wait().await.unwrap_err();
        assert!(matches!(err, SandboxError::ExitLost { ref command } if command == "npm install"));
    }
}
