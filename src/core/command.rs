//! Named command invocations
//!
//! The command table itself (names, aliases, tags) lives outside this
//! crate. Callers hand in the resolved [`Invocation`] for a name, either
//! directly to the session or through a [`CommandTable`] when pipeline
//! steps refer to commands by name.

use std::collections::HashMap;
use std::time::Duration;

/// A named command ready to dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,

    /// Command template, may contain `${VAR}` references
    pub command: String,

    /// Extra environment for the process
    pub env: HashMap<String, String>,

    pub timeout: Option<Duration>,

    /// Ask before running
    pub confirm: bool,
}

impl Invocation {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn requiring_confirmation(mut self) -> Self {
        self.confirm = true;
        self
    }
}

/// Lookup of named commands
pub trait CommandTable: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Invocation>;
}

impl CommandTable for HashMap<String, Invocation> {
    fn lookup(&self, name: &str) -> Option<Invocation> {
        self.get(name).cloned()
    }
}

/// Table with no commands
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommands;

impl CommandTable for NoCommands {
    fn lookup(&self, _name: &str) -> Option<Invocation> {
        None
    }
}
