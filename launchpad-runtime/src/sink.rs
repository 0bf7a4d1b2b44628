//! Output sinks: write-only destinations for process output.

use std::borrow::Cow;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output sink is not open")]
    NotOpen,

    #[error("output sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A display surface process output is written to.
///
/// `open` binds the sink to its surface and must precede any `write`.
pub trait OutputSink: Send + Sync {
    fn open(&self) -> Result<(), SinkError>;

    fn write(&self, chunk: &str) -> Result<(), SinkError>;
}

/// Convert bare `\n` to `\r\n`, leaving existing `\r\n` pairs alone.
///
/// `after_cr` says whether the previous chunk ended in `\r`, so a pair split
/// across two chunks is not doubled.
pub fn convert_eol(chunk: &str, after_cr: bool) -> Cow<'_, str> {
    if !chunk.contains('\n') {
        return Cow::Borrowed(chunk);
    }
    let mut out = String::with_capacity(chunk.len() + 8);
    let mut prev = if after_cr { '\r' } else { '\0' };
    for ch in chunk.chars() {
        if ch == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(ch);
        prev = ch;
    }
    Cow::Owned(out)
}

struct Terminal {
    out: Box<dyn Write + Send>,
    /// Last chunk written ended in `\r`.
    after_cr: bool,
}

/// Writes output verbatim to a terminal (stdout by default).
pub struct TerminalSink {
    terminal: Mutex<Terminal>,
    convert_eol: bool,
    opened: AtomicBool,
}

impl TerminalSink {
    pub fn stdout(convert_eol: bool) -> Self {
        Self::new(Box::new(std::io::stdout()), convert_eol)
    }

    pub fn new(out: Box<dyn Write + Send>, convert_eol: bool) -> Self {
        Self {
            terminal: Mutex::new(Terminal {
                out,
                after_cr: false,
            }),
            convert_eol,
            opened: AtomicBool::new(false),
        }
    }
}

impl OutputSink for TerminalSink {
    fn open(&self) -> Result<(), SinkError> {
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn write(&self, chunk: &str) -> Result<(), SinkError> {
        if !self.opened.load(Ordering::SeqCst) {
            return Err(SinkError::NotOpen);
        }
        if chunk.is_empty() {
            return Ok(());
        }
        let mut terminal = self.terminal.lock().unwrap_or_else(PoisonError::into_inner);
        let text = if self.convert_eol {
            convert_eol(chunk, terminal.after_cr)
        } else {
            Cow::Borrowed(chunk)
        };
        terminal.out.write_all(text.as_bytes())?;
        terminal.out.flush()?;
        terminal.after_cr = chunk.ends_with('\r');
        Ok(())
    }
}

/// Keeps every write in memory, in order. Useful for transcripts and tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    opens: AtomicUsize,
    writes: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All writes concatenated.
    pub fn text(&self) -> String {
        self.writes().concat()
    }
}

impl OutputSink for RecordingSink {
    fn open(&self) -> Result<(), SinkError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&self, chunk: &str) -> Result<(), SinkError> {
        if self.open_count() == 0 {
            return Err(SinkError::NotOpen);
        }
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chunk.to_string());
        Ok(())
    }
}
