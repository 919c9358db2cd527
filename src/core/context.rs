//! Run context handed to scripted steps

use crate::{
    core::error::ScriptError,
    execution::{engine::RunEvent, EventHandler, ExecutionResult, Executor, OutputBuffer, RunOptions},
    variables::VariableResolver,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// In-process step logic
///
/// Returning `Ok` marks the step succeeded. A command that exits non-zero
/// is not an error by itself; the script inspects the result and decides.
#[async_trait]
pub trait ScriptedStep: Send + Sync {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), ScriptError>;
}

/// What a scripted step can see and do during a run
///
/// Commands go through the same executor as shell steps, so they are
/// masked, captured and stored in the replay buffer the same way.
pub struct StepContext<'a> {
    step: &'a str,
    executor: &'a Executor,
    resolver: &'a VariableResolver,
    vars: &'a mut HashMap<String, String>,
    options: RunOptions,
    buffer: &'a OutputBuffer,
    events: &'a [EventHandler],
    results: Vec<Arc<ExecutionResult>>,
    logs: Vec<String>,
}

impl<'a> StepContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        step: &'a str,
        executor: &'a Executor,
        resolver: &'a VariableResolver,
        vars: &'a mut HashMap<String, String>,
        options: RunOptions,
        buffer: &'a OutputBuffer,
        events: &'a [EventHandler],
    ) -> Self {
        Self {
            step,
            executor,
            resolver,
            vars,
            options,
            buffer,
            events,
            results: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn step_name(&self) -> &str {
        self.step
    }

    /// Record a message against this step
    pub fn log(&mut self, message: impl Into<String>) {
        let message = self.resolver.secrets().mask_all(&message.into());
        info!("[{}] {}", self.step, message);
        for handler in self.events {
            handler(RunEvent::StepLog {
                step: self.step.to_string(),
                message: message.clone(),
            });
        }
        self.logs.push(message);
    }

    /// Resolve `${VAR}` references and run the command
    pub async fn run(&mut self, command: &str) -> Result<Arc<ExecutionResult>, ScriptError> {
        let resolved = self.resolver.resolve(command, self.vars)?;
        let result = Arc::new(self.executor.run(&resolved, &self.options).await?);
        self.buffer.push(result.clone());
        self.results.push(result.clone());
        Ok(result)
    }

    /// Look a variable up through every layer, run-local first
    pub fn var(&self, name: &str) -> Option<String> {
        self.resolver.lookup(name, self.vars).map(|(_, value)| value)
    }

    /// Set a run-local variable, visible to later steps of this run
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn resolve(&self, text: &str) -> Result<String, ScriptError> {
        Ok(self.resolver.resolve(text, self.vars)?)
    }

    /// Results of the commands run so far by this step
    pub fn results(&self) -> &[Arc<ExecutionResult>] {
        &self.results
    }

    pub(crate) fn finish(self) -> (Vec<Arc<ExecutionResult>>, Vec<String>) {
        (self.results, self.logs)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::variables::SecretStore;

    #[tokio::test]
    async fn test_context_runs_and_records() {
        let secrets = Arc::new(SecretStore::new());
        secrets.add("PASS", "letmein");
        let executor = Executor::new("/bin/sh", secrets.clone());
        let resolver = VariableResolver::new(HashMap::new(), secrets);
        let buffer = OutputBuffer::new(4);
        let mut vars = HashMap::from([("who".to_string(), "ops".to_string())]);

        let mut ctx = StepContext::new("greet", &executor, &resolver, &mut vars, RunOptions::new(), &buffer, &[]);

        let result = ctx.run("echo hello ${who}").await.unwrap();
        assert_eq!(result.stdout().trim(), "hello ops");

        ctx.set_var("who", "devs");
        assert_eq!(ctx.var("who").as_deref(), Some("devs"));
        ctx.log("password is letmein");

        let err = ctx.run("echo ${nope}").await.unwrap_err();
        assert!(matches!(err, ScriptError::Variable(_)));

        let (results, logs) = ctx.finish();
        assert_eq!(results.len(), 1);
        assert_eq!(logs, vec!["password is ***".to_string()]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(vars.get("who").map(String::as_str), Some("devs"));
    }
}
