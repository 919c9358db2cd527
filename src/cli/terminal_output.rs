//! Terminal-side collaborators: live output sink and confirmation prompt
//!
//! # Example
//!
//! ```no_run
//! use writ::cli::terminal_output::TerminalSink;
//! use writ::execution::{OutputSink, StreamKind};
//!
//! let sink = TerminalSink::new(false);
//! sink.on_line(StreamKind::Stdout, "deployed\n");
//! ```

use crate::execution::{Confirm, OutputSink, StreamKind};
use console::{style, Term};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Prints masked output lines as they arrive
///
/// Stdout lines go to stdout, stderr lines to stderr. Writes are
/// serialized so lines from the two reader tasks never interleave
/// mid-line.
#[derive(Debug)]
pub struct TerminalSink {
    dim_stderr: bool,
    lines: AtomicUsize,
    write_lock: Mutex<()>,
}

impl TerminalSink {
    /// `dim_stderr` renders stderr lines dimmed
    pub fn new(dim_stderr: bool) -> Self {
        Self {
            dim_stderr,
            lines: AtomicUsize::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Lines printed so far
    pub fn line_count(&self) -> usize {
        self.lines.load(Ordering::SeqCst)
    }
}

impl OutputSink for TerminalSink {
    fn on_line(&self, stream: StreamKind, line: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let text = line.strip_suffix('\n').unwrap_or(line);
        match stream {
            StreamKind::Stdout => {
                let mut out = io::stdout().lock();
                let _ = writeln!(out, "{}", text);
                let _ = out.flush();
            }
            StreamKind::Stderr => {
                let mut err = io::stderr().lock();
                let _ = if self.dim_stderr {
                    writeln!(err, "{}", style(text).dim())
                } else {
                    writeln!(err, "{}", text)
                };
                let _ = err.flush();
            }
        }
        self.lines.fetch_add(1, Ordering::SeqCst);
    }
}

/// Asks `[y/N]` on the terminal
///
/// Anything but `y`/`yes` declines, as does a closed or non-interactive
/// terminal.
#[derive(Debug, Default)]
pub struct TerminalConfirm;

impl TerminalConfirm {
    fn parse_answer(answer: &str) -> bool {
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let term = Term::stderr();
        if !term.is_term() {
            return false;
        }
        if term.write_str(&format!("{} [y/N] ", style(prompt).bold())).is_err() {
            return false;
        }
        term.read_line().map(|answer| Self::parse_answer(&answer)).unwrap_or(false)
    }
}
