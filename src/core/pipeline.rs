//! Pipeline domain model
//!
//! [`PipelineSpec`] is the decoded shape of a workflow definition, whatever
//! format it came from. [`PipelineDefinition::from_spec`] validates it and
//! builds the runnable model; definitions can also be built in code.

use crate::core::{
    command::{CommandTable, NoCommands},
    condition::Condition,
    config::render_value,
    error::PipelineError,
    step::{Action, FailurePolicy, Step},
};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Decoded workflow definition
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Run-local variable defaults
    #[serde(default)]
    pub variables: HashMap<String, Value>,

    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// Decoded step
#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub name: String,

    /// Shell command text
    #[serde(default)]
    pub run: Option<String>,

    /// Name of a command from the command table
    #[serde(default)]
    pub command: Option<String>,

    /// `abort` (default) or `continue`
    #[serde(default)]
    pub on_failure: Option<String>,

    /// Conditions, all of which must hold
    #[serde(default)]
    pub when: Vec<HashMap<String, Value>>,

    #[serde(default)]
    pub confirm: bool,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// A validated, runnable pipeline
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub description: Option<String>,

    /// Defaults for the run-local variable layer
    pub variables: HashMap<String, String>,

    pub steps: Vec<Step>,
}

impl PipelineDefinition {
    /// Start an empty definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            variables: HashMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Build from a decoded spec whose steps use `run` only
    pub fn from_spec(spec: &PipelineSpec) -> Result<Self, PipelineError> {
        Self::from_spec_with_commands(spec, &NoCommands)
    }

    /// Build from a decoded spec, resolving `command:` steps through `commands`
    pub fn from_spec_with_commands(spec: &PipelineSpec, commands: &dyn CommandTable) -> Result<Self, PipelineError> {
        let steps = spec
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| build_step(index, step, commands))
            .collect::<Result<Vec<_>, _>>()?;

        let definition = Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            variables: spec
                .variables
                .iter()
                .map(|(key, value)| (key.clone(), render_value(value)))
                .collect(),
            steps,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Check names and step references
    ///
    /// A pipeline needs at least one step, and a `step.<name>` condition may
    /// only refer to a step defined earlier.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::MissingName);
        }
        if self.steps.is_empty() {
            return Err(PipelineError::NoSteps {
                name: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(PipelineError::EmptyStepName { index });
            }

            for condition in &step.conditions {
                if let Condition::Step { name, expected } = condition {
                    if !seen.contains(name.as_str()) {
                        return Err(PipelineError::InvalidCondition {
                            step: step.name.clone(),
                            key: format!("step.{}", name),
                            value: expected.to_string(),
                            reason: format!("no step '{}' runs before '{}'", name, step.name),
                        });
                    }
                }
            }

            if !seen.insert(step.name.as_str()) {
                return Err(PipelineError::DuplicateStep {
                    step: step.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

fn build_step(index: usize, spec: &StepSpec, commands: &dyn CommandTable) -> Result<Step, PipelineError> {
    if spec.name.trim().is_empty() {
        return Err(PipelineError::EmptyStepName { index });
    }
    let name = spec.name.clone();

    let mut step = match (&spec.run, &spec.command) {
        (Some(_), Some(_)) => return Err(PipelineError::AmbiguousAction { step: name }),
        (None, None) => return Err(PipelineError::MissingAction { step: name }),
        (Some(run), None) => Step::shell(&name, run.clone()),
        (None, Some(command)) => {
            let invocation = commands.lookup(command).ok_or_else(|| PipelineError::UnknownCommand {
                step: name.clone(),
                command: command.clone(),
            })?;
            let mut step = Step::shell(&name, invocation.command);
            step.env = invocation.env;
            step.timeout = invocation.timeout;
            step.confirm = invocation.confirm;
            step
        }
    };

    if let Action::Shell(command) = &step.action {
        if command.trim().is_empty() {
            return Err(PipelineError::MissingAction { step: name });
        }
    }

    if let Some(policy) = &spec.on_failure {
        step.on_failure = policy
            .parse::<FailurePolicy>()
            .map_err(|value| PipelineError::UnknownFailurePolicy {
                step: name.clone(),
                value,
            })?;
    }

    for entry in &spec.when {
        let mut pairs: Vec<(&String, &Value)> = entry.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in pairs {
            let value = render_value(value);
            let condition = Condition::parse(key, &value).map_err(|reason| PipelineError::InvalidCondition {
                step: name.clone(),
                key: key.clone(),
                value: value.clone(),
                reason,
            })?;
            step.conditions.push(condition);
        }
    }

    step.confirm |= spec.confirm;
    if let Some(secs) = spec.timeout_secs {
        step.timeout = Some(Duration::from_secs(secs));
    }
    step.env.extend(spec.env.clone());

    Ok(step)
}
