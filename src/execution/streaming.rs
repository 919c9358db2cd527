//! Live output delivery while a command runs
//!
//! The executor hands every line it reads to an [`OutputSink`] as soon as
//! the line arrives, after masking. The same text is accumulated into the
//! final [`ExecutionResult`](crate::execution::ExecutionResult).
//!
//! # Example
//!
//! ```
//! use writ::execution::{OutputSink, StreamKind};
//!
//! struct Printer;
//!
//! impl OutputSink for Printer {
//!     fn on_line(&self, stream: StreamKind, line: &str) {
//!         if stream == StreamKind::Stdout {
//!             print!("{}", line);
//!         }
//!     }
//! }
//! ```

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Receives masked output lines as they are produced
///
/// Called from the reader tasks, possibly from two tasks at once.
/// Lines keep their trailing newline when the process wrote one.
pub trait OutputSink: Send + Sync {
    fn on_line(&self, stream: StreamKind, line: &str);
}

/// Sink that drops everything
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl OutputSink for NoopSink {
    fn on_line(&self, _stream: StreamKind, _line: &str) {}
}
