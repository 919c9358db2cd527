//! Execution result records

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Exit code reported for a process killed at its deadline
pub const TIMEOUT_EXIT_CODE: i32 = -9;

/// Exit code reported for a process killed on cancellation
pub const CANCELLED_EXIT_CODE: i32 = -2;

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// The process exited on its own with this code
    Exited { code: i32 },
    /// The process was killed by a signal nobody here sent
    Signaled { signal: i32 },
    /// Killed after running past its timeout
    TimedOut { timeout_ms: u64 },
    /// Killed because the run was cancelled
    Cancelled,
}

impl Termination {
    /// Conventional numeric status
    pub fn code(&self) -> i32 {
        match self {
            Termination::Exited { code } => *code,
            Termination::Signaled { signal } => 128 + signal,
            Termination::TimedOut { .. } => TIMEOUT_EXIT_CODE,
            Termination::Cancelled => CANCELLED_EXIT_CODE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Exited { code: 0 })
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited { code } => write!(f, "exit code {}", code),
            Termination::Signaled { signal } => write!(f, "killed by signal {}", signal),
            Termination::TimedOut { timeout_ms } => {
                write!(f, "timed out after {:.1}s", *timeout_ms as f64 / 1000.0)
            }
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One executed command
///
/// Built once by the executor and never changed afterwards. The command
/// text and both output streams are already masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    command: String,
    stdout: String,
    stderr: String,
    termination: Termination,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn new(
        command: String,
        stdout: String,
        stderr: String,
        termination: Termination,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            command,
            stdout,
            stderr,
            termination,
            started_at,
            finished_at,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn exit_code(&self) -> i32 {
        self.termination.code()
    }

    /// True only for a clean exit with code 0
    pub fn success(&self) -> bool {
        self.termination.is_success()
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.termination, Termination::TimedOut { .. })
    }

    pub fn cancelled(&self) -> bool {
        matches!(self.termination, Termination::Cancelled)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn duration(&self) -> Duration {
        self.finished_at
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}
