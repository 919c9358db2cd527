//! Error taxonomy for the execution subsystem
//!
//! Expected execution outcomes (non-zero exits, timeouts, cancellations)
//! are never errors: they travel as `ExecutionResult` values. The types
//! here are the fatal or caller-visible failure kinds.

use std::path::PathBuf;
use thiserror::Error;

/// A `${NAME}` reference could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariableError {
    #[error("Unresolved variable: {name}")]
    Unresolved { name: String },
}

impl VariableError {
    /// Name of the reference that failed
    pub fn name(&self) -> &str {
        match self {
            VariableError::Unresolved { name } => name,
        }
    }
}

/// A process could not be started at all
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Failed to spawn '{command}' via {shell}: {source}")]
    Spawn {
        /// Masked command text
        command: String,
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Malformed pipeline definition, or a fatal failure while running one
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline has no name")]
    MissingName,

    #[error("Pipeline '{name}' has no steps")]
    NoSteps { name: String },

    #[error("Step #{index} has an empty name")]
    EmptyStepName { index: usize },

    #[error("Duplicate step name '{step}'")]
    DuplicateStep { step: String },

    #[error("Step '{step}' has unknown failure policy '{value}' (expected 'abort' or 'continue')")]
    UnknownFailurePolicy { step: String, value: String },

    #[error("Step '{step}' has no action to run")]
    MissingAction { step: String },

    #[error("Step '{step}' declares more than one action")]
    AmbiguousAction { step: String },

    #[error("Step '{step}' refers to unknown command '{command}'")]
    UnknownCommand { step: String, command: String },

    #[error("Step '{step}' has invalid condition '{key}: {value}': {reason}")]
    InvalidCondition {
        step: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Step '{step}' could not be executed: {source}")]
    Execution {
        step: String,
        #[source]
        source: ExecutionError,
    },
}

impl PipelineError {
    /// Step the error is attributed to, if any
    pub fn step_name(&self) -> Option<&str> {
        match self {
            PipelineError::MissingName
            | PipelineError::NoSteps { .. }
            | PipelineError::EmptyStepName { .. } => None,
            PipelineError::DuplicateStep { step }
            | PipelineError::UnknownFailurePolicy { step, .. }
            | PipelineError::MissingAction { step }
            | PipelineError::AmbiguousAction { step }
            | PipelineError::UnknownCommand { step, .. }
            | PipelineError::InvalidCondition { step, .. }
            | PipelineError::Execution { step, .. } => Some(step),
        }
    }
}

/// Why a scripted step did not succeed
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script decided the step failed
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Variable(#[from] VariableError),

    /// A command could not be started; fatal to the run
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl ScriptError {
    pub fn failed(message: impl Into<String>) -> Self {
        ScriptError::Failed(message.into())
    }
}

/// Configuration could not be loaded or is invalid
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid mode: {0}. Must be one of strict, open")]
    InvalidMode(String),

    #[error("Output buffer size must be at least 1")]
    ZeroBufferSize,

    #[error("Unknown secret source '{0}' (expected 'env' or 'dotenv')")]
    UnknownSecretSource(String),
}

/// Replay index outside the stored range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("No output #{index} to replay ({available} stored)")]
    NotFound { index: usize, available: usize },
}

/// Failures surfaced by the dispatch surface
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Shell escape disabled in strict mode")]
    ShellEscapeDenied,

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Fork log lookup failures
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No fork log matching '{0}'")]
    NotFound(String),

    #[error("Ambiguous fork id '{prefix}' matches {count} logs")]
    Ambiguous { prefix: String, count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_error_names_reference() {
        let err = VariableError::Unresolved { name: "HOST".to_string() };
        assert_eq!(err.name(), "HOST");
        assert_eq!(err.to_string(), "Unresolved variable: HOST");
    }

    #[test]
    fn test_pipeline_error_attribution() {
        let err = PipelineError::UnknownFailurePolicy {
            step: "deploy".to_string(),
            value: "retry".to_string(),
        };
        assert_eq!(err.step_name(), Some("deploy"));
        assert!(err.to_string().contains("retry"));
        assert_eq!(PipelineError::MissingName.step_name(), None);
    }
}
