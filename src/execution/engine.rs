//! Pipeline runner - sequences steps, evaluates conditions, applies failure policy

use crate::{
    core::{
        context::StepContext,
        error::{PipelineError, ScriptError},
        security::{GatedAction, SecurityGate},
        state::{RunOutcome, RunStatus, StepOutcome, StepStatus},
        step::{Action, FailurePolicy, Step},
        PipelineDefinition,
    },
    execution::{CancelToken, ExecutionResult, Executor, OutputBuffer, RunOptions},
    variables::VariableResolver,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that occur while a pipeline runs
#[derive(Debug, Clone)]
pub enum RunEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepSkipped {
        step: String,
        reason: String,
    },
    StepStarted {
        step: String,
        /// Masked command text, for shell steps
        command: Option<String>,
    },
    StepLog {
        step: String,
        message: String,
    },
    StepSucceeded {
        step: String,
    },
    StepFailed {
        step: String,
        reason: String,
    },
    PipelineFinished {
        execution_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Asked before running anything marked `confirm`
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Gives the same answer to every prompt
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        debug!("Auto-answering '{}' with {}", prompt, self.0);
        self.0
    }
}

/// Runs pipeline definitions step by step
///
/// Steps run strictly in order. A step whose conditions do not hold is
/// skipped, which never counts as a failure. A failed step stops the run
/// under `abort` and is recorded under `continue`; a cancelled step always
/// stops the run.
pub struct PipelineRunner {
    executor: Arc<Executor>,
    resolver: VariableResolver,
    gate: SecurityGate,
    buffer: Arc<OutputBuffer>,
    confirmer: Arc<dyn Confirm>,
    cancel: Option<CancelToken>,
    event_handlers: Mutex<Vec<EventHandler>>,
}

impl PipelineRunner {
    /// Create a runner; confirmation prompts are declined until a
    /// confirmer is supplied
    pub fn new(
        executor: Arc<Executor>,
        resolver: VariableResolver,
        gate: SecurityGate,
        buffer: Arc<OutputBuffer>,
    ) -> Self {
        Self {
            executor,
            resolver,
            gate,
            buffer,
            confirmer: Arc::new(AutoConfirm(false)),
            cancel: None,
            event_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirm>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Stop the current and all later steps when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(RunEvent) + Send + Sync + 'static,
    {
        self.event_handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(handler));
    }

    pub fn buffer(&self) -> &Arc<OutputBuffer> {
        &self.buffer
    }

    pub fn resolver(&self) -> &VariableResolver {
        &self.resolver
    }

    fn handlers(&self) -> Vec<EventHandler> {
        self.event_handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn emit(handlers: &[EventHandler], event: RunEvent) {
        for handler in handlers {
            handler(event.clone());
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Run every step of `definition`
    ///
    /// `extra_vars` override the definition's variable defaults in the
    /// run-local layer. Only a malformed definition or a command that
    /// cannot be spawned is an `Err`; everything else is in the outcome.
    pub async fn run_pipeline(
        &self,
        definition: &PipelineDefinition,
        extra_vars: HashMap<String, String>,
    ) -> Result<RunOutcome, PipelineError> {
        definition.validate()?;

        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let handlers = self.handlers();

        let mut vars = definition.variables.clone();
        vars.extend(extra_vars);

        info!("Starting pipeline: {} ({})", definition.name, execution_id);
        Self::emit(
            &handlers,
            RunEvent::PipelineStarted {
                execution_id,
                pipeline_name: definition.name.clone(),
                total_steps: definition.steps.len(),
            },
        );

        let mut history: Vec<StepOutcome> = Vec::new();
        let mut aborted_at = None;

        for step in &definition.steps {
            if self.cancelled() {
                warn!("Run cancelled before step '{}'", step.name);
                aborted_at = Some(step.name.clone());
                break;
            }

            if let Some(reason) = self.skip_reason(step, &history, &vars) {
                info!("Skipping step '{}': {}", step.name, reason);
                Self::emit(
                    &handlers,
                    RunEvent::StepSkipped {
                        step: step.name.clone(),
                        reason: reason.clone(),
                    },
                );
                history.push(StepOutcome::new(&step.name, StepStatus::Skipped { reason }));
                continue;
            }

            let outcome = match self.execute_step(step, &mut vars, &handlers).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Pipeline '{}' stopped: {}", definition.name, e);
                    Self::emit(
                        &handlers,
                        RunEvent::StepFailed {
                            step: step.name.clone(),
                            reason: e.to_string(),
                        },
                    );
                    return Err(e);
                }
            };

            let was_cancelled = outcome.results.iter().any(|r| r.cancelled()) || self.cancelled();
            let failed = outcome.status.is_failure();
            history.push(outcome);

            if was_cancelled {
                warn!("Step '{}' cancelled, aborting run", step.name);
                aborted_at = Some(step.name.clone());
                break;
            }
            if failed {
                match step.on_failure {
                    FailurePolicy::Abort => {
                        warn!("Step '{}' failed, aborting run", step.name);
                        aborted_at = Some(step.name.clone());
                        break;
                    }
                    FailurePolicy::Continue => {
                        warn!("Step '{}' failed, continuing", step.name);
                    }
                }
            }
        }

        let status = if aborted_at.is_some() {
            RunStatus::Aborted
        } else if history.iter().any(|s| s.status.is_failure()) {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Completed
        };

        info!("Pipeline '{}' {}", definition.name, status);
        Self::emit(&handlers, RunEvent::PipelineFinished { execution_id, status });

        Ok(RunOutcome {
            execution_id,
            pipeline_name: definition.name.clone(),
            status,
            steps: history,
            aborted_at,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Why `step` should not run, if it should not
    fn skip_reason(&self, step: &Step, history: &[StepOutcome], vars: &HashMap<String, String>) -> Option<String> {
        let lookup = |name: &str| self.resolver.lookup(name, vars).map(|(_, value)| value);
        if let Some(unmet) = step
            .conditions
            .iter()
            .find(|condition| !condition.evaluate(history, lookup))
        {
            return Some(format!("condition not met: {}", unmet));
        }

        if step.confirm && !self.confirmer.confirm(&format!("Run step '{}'?", step.name)) {
            return Some("not confirmed".to_string());
        }

        // Steps are never blocked; the gate logs the mode in effect
        self.gate.permit(GatedAction::PipelineStep);

        None
    }

    async fn execute_step(
        &self,
        step: &Step,
        vars: &mut HashMap<String, String>,
        handlers: &[EventHandler],
    ) -> Result<StepOutcome, PipelineError> {
        let options = RunOptions {
            timeout: step.timeout,
            env: step.env.clone(),
            cancel: self.cancel.clone(),
        };
        let started_at = Utc::now();

        let (status, results, logs) = match &step.action {
            Action::Shell(template) => match self.resolver.resolve(template, vars) {
                Err(e) => {
                    warn!("Step '{}': {}", step.name, e);
                    (StepStatus::Failed { reason: e.to_string() }, Vec::new(), Vec::new())
                }
                Ok(command) => {
                    info!("Running step: {}", step.name);
                    Self::emit(
                        handlers,
                        RunEvent::StepStarted {
                            step: step.name.clone(),
                            command: Some(self.executor.secrets().mask_all(&command)),
                        },
                    );
                    let result = self
                        .executor
                        .run(&command, &options)
                        .await
                        .map_err(|source| PipelineError::Execution {
                            step: step.name.clone(),
                            source,
                        })?;
                    let result = Arc::new(result);
                    self.buffer.push(result.clone());
                    (status_of(&result), vec![result], Vec::new())
                }
            },
            Action::Script(script) => {
                info!("Running scripted step: {}", step.name);
                Self::emit(
                    handlers,
                    RunEvent::StepStarted {
                        step: step.name.clone(),
                        command: None,
                    },
                );
                let mut ctx = StepContext::new(
                    &step.name,
                    self.executor.as_ref(),
                    &self.resolver,
                    vars,
                    options,
                    self.buffer.as_ref(),
                    handlers,
                );
                let ran = script.run(&mut ctx).await;
                let (results, logs) = ctx.finish();
                let status = match ran {
                    Ok(()) => StepStatus::Succeeded,
                    Err(ScriptError::Execution(source)) => {
                        return Err(PipelineError::Execution {
                            step: step.name.clone(),
                            source,
                        })
                    }
                    Err(e) => StepStatus::Failed { reason: e.to_string() },
                };
                (status, results, logs)
            }
        };

        match &status {
            StepStatus::Failed { reason } => Self::emit(
                handlers,
                RunEvent::StepFailed {
                    step: step.name.clone(),
                    reason: reason.clone(),
                },
            ),
            _ => Self::emit(
                handlers,
                RunEvent::StepSucceeded {
                    step: step.name.clone(),
                },
            ),
        }

        Ok(StepOutcome {
            name: step.name.clone(),
            status,
            results,
            logs,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        })
    }
}

fn status_of(result: &ExecutionResult) -> StepStatus {
    if result.success() {
        StepStatus::Succeeded
    } else {
        StepStatus::Failed {
            reason: result.termination().to_string(),
        }
    }
}
