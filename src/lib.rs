//! writ - An operator command dispatcher with masked, auditable shell execution

pub mod cli;
pub mod core;
pub mod execution;
pub mod session;
pub mod variables;

// Re-export commonly used types
pub use core::{
    Action, FailurePolicy, Invocation, PipelineDefinition, RunOutcome, RunStatus, ScriptedStep, SecurityMode, Settings,
    Step, StepContext, StepOutcome, StepStatus,
};
pub use execution::{CancelToken, Interrupter, ExecutionResult, Executor, OutputBuffer, PipelineRunner, RunEvent, Termination};
pub use session::{Dispatch, Session, SessionOptions};
pub use variables::{SecretStore, VariableResolver};
