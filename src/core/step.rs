//! Step domain model

use crate::core::{condition::Condition, context::ScriptedStep};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// What to do when a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run
    #[default]
    Abort,
    /// Record the failure and move on
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(FailurePolicy::Abort),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::Continue => write!(f, "continue"),
        }
    }
}

/// What a step does when it runs
#[derive(Clone)]
pub enum Action {
    /// Shell command text, `${VAR}` references resolved at run time
    Shell(String),
    /// In-process code driving commands through a step context
    Script(Arc<dyn ScriptedStep>),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Shell(command) => f.debug_tuple("Shell").field(command).finish(),
            Action::Script(_) => f.write_str("Script(..)"),
        }
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique within its pipeline
    pub name: String,

    pub action: Action,

    /// All must hold for the step to run
    pub conditions: Vec<Condition>,

    pub on_failure: FailurePolicy,

    /// Ask the confirmation provider before running
    pub confirm: bool,

    /// Overrides the executor's default timeout
    pub timeout: Option<Duration>,

    /// Extra environment for commands run by this step
    pub env: HashMap<String, String>,
}

impl Step {
    fn with_action(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            conditions: Vec::new(),
            on_failure: FailurePolicy::Abort,
            confirm: false,
            timeout: None,
            env: HashMap::new(),
        }
    }

    /// A step running a shell command
    pub fn shell(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::with_action(name, Action::Shell(command.into()))
    }

    /// A step running in-process code
    pub fn scripted(name: impl Into<String>, script: impl ScriptedStep + 'static) -> Self {
        Self::with_action(name, Action::Script(Arc::new(script)))
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn requiring_confirmation(mut self) -> Self {
        self.confirm = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn is_scripted(&self) -> bool {
        matches!(self.action, Action::Script(_))
    }
}
