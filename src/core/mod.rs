//! Core domain models
//!
//! Settings, the security gate, pipeline and step definitions, run outcomes
//! and the error types shared by the rest of the crate.

pub mod command;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod security;
pub mod state;
pub mod step;

pub use command::{CommandTable, Invocation, NoCommands};
pub use condition::{Condition, Expected};
pub use config::Settings;
pub use context::{ScriptedStep, StepContext};
pub use error::*;
pub use pipeline::{PipelineDefinition, PipelineSpec, StepSpec};
pub use security::{GatedAction, ModeState, SecurityGate, SecurityMode};
pub use state::{RunOutcome, RunStatus, StepOutcome, StepStatus};
pub use step::{Action, FailurePolicy, Step};
