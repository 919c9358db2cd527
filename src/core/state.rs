//! Run and step outcome models

use crate::core::condition::Expected;
use crate::execution::ExecutionResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every executed step succeeded
    Completed,
    /// Reached the end, but some `continue` steps failed
    CompletedWithFailures,
    /// Stopped early by an `abort` failure or a cancellation
    Aborted,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::CompletedWithFailures => write!(f, "completed with failures"),
            RunStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Final state of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepStatus {
    /// Not executed (a condition was false or confirmation was declined)
    Skipped { reason: String },
    Succeeded,
    Failed { reason: String },
}

impl StepStatus {
    pub fn was_executed(&self) -> bool {
        !matches!(self, StepStatus::Skipped { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Failed { .. })
    }

    /// Whether the step ended as `expected`; a skipped step counts as succeeded
    pub fn matches(&self, expected: Expected) -> bool {
        match (self, expected) {
            (StepStatus::Succeeded | StepStatus::Skipped { .. }, Expected::Succeeded) => true,
            (StepStatus::Failed { .. }, Expected::Failed) => true,
            _ => false,
        }
    }
}

/// Record of one step within a run
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,

    /// Every command the step ran, in order
    pub results: Vec<Arc<ExecutionResult>>,

    /// Messages logged by a scripted step
    pub logs: Vec<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepOutcome {
    pub fn new(name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            name: name.into(),
            status,
            results: Vec::new(),
            logs: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// The last command result, if the step ran any
    pub fn last_result(&self) -> Option<&Arc<ExecutionResult>> {
        self.results.last()
    }
}

/// Result of running a whole pipeline
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Unique id of this run
    pub execution_id: Uuid,
    pub pipeline_name: String,
    pub status: RunStatus,

    /// One entry per step reached, in definition order
    pub steps: Vec<StepOutcome>,

    /// Step that stopped the run, when aborted
    pub aborted_at: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    /// Outcome of a step by name
    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Names of the steps that failed
    pub fn failed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.status.is_failure())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Names of the steps that were skipped
    pub fn skipped_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !s.status.was_executed())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Every execution result of the run, in order
    pub fn results(&self) -> impl Iterator<Item = &Arc<ExecutionResult>> {
        self.steps.iter().flat_map(|s| s.results.iter())
    }
}
