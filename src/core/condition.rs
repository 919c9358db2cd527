//! Step conditions

use crate::core::state::StepOutcome;
use std::fmt;
use std::str::FromStr;

/// Outcome a condition expects of an earlier step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Succeeded,
    Failed,
}

impl FromStr for Expected {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(Expected::Succeeded),
            "failed" => Ok(Expected::Failed),
            other => Err(format!("expected 'succeeded' or 'failed', got '{}'", other)),
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Succeeded => write!(f, "succeeded"),
            Expected::Failed => write!(f, "failed"),
        }
    }
}

/// One guard on a step; a step runs only when all of its guards hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The immediately preceding step ended this way
    PreviousStep(Expected),
    /// A named earlier step ended this way
    Step { name: String, expected: Expected },
    /// A variable resolves to exactly this value
    VariableEquals { name: String, value: String },
}

impl Condition {
    /// Parse a `key: value` pair
    ///
    /// `prev_step` and `step.<name>` take an outcome; any other key is a
    /// variable name compared against the literal value.
    pub fn parse(key: &str, value: &str) -> Result<Self, String> {
        if key == "prev_step" {
            return Ok(Condition::PreviousStep(value.parse()?));
        }
        if let Some(name) = key.strip_prefix("step.") {
            if name.is_empty() {
                return Err("missing step name after 'step.'".to_string());
            }
            return Ok(Condition::Step {
                name: name.to_string(),
                expected: value.parse()?,
            });
        }
        if key.is_empty() {
            return Err("empty condition key".to_string());
        }
        Ok(Condition::VariableEquals {
            name: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Check the condition against the steps run so far
    ///
    /// A skipped step counts as succeeded. `PreviousStep` is false for the
    /// first step, a `Step` condition is false when the named step has not
    /// been reached, and a comparison against a variable that does not
    /// resolve is false.
    pub fn evaluate<F>(&self, history: &[StepOutcome], lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            Condition::PreviousStep(expected) => history
                .last()
                .is_some_and(|outcome| outcome.status.matches(*expected)),
            Condition::Step { name, expected } => history
                .iter()
                .find(|outcome| &outcome.name == name)
                .is_some_and(|outcome| outcome.status.matches(*expected)),
            Condition::VariableEquals { name, value } => {
                lookup(name).is_some_and(|actual| &actual == value)
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::PreviousStep(expected) => write!(f, "prev_step: {}", expected),
            Condition::Step { name, expected } => write!(f, "step.{}: {}", name, expected),
            Condition::VariableEquals { name, value } => write!(f, "{}: {}", name, value),
        }
    }
}
