//! Dispatch surface tying the subsystem together
//!
//! A [`Session`] owns one of everything: secrets, mode state, executor,
//! replay buffer and resolver. The REPL or CLI on top hands it named
//! command invocations, shell escapes and pipeline definitions.

use crate::{
    core::{
        command::Invocation,
        config::{expand_home, Settings},
        error::{BufferError, ConfigError, DispatchError, ExecutionError, LogError, PipelineError},
        security::{GatedAction, ModeState, SecurityGate, SecurityMode},
        state::RunOutcome,
        PipelineDefinition,
    },
    execution::{
        fork, AutoConfirm, Confirm, ExecutionResult, Executor, ForkHandle, ForkLogSummary,
        Interrupter, OutputBuffer, OutputSink, PipelineRunner, RunOptions,
    },
    variables::{ProcessEnv, SecretLoadPlan, SecretStore, VariableEntry, VariableResolver, VariableSource},
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a dispatch
#[derive(Debug, Clone)]
pub enum Dispatch {
    Executed(Arc<ExecutionResult>),
    /// The operator declined the confirmation prompt
    Declined,
}

impl Dispatch {
    pub fn result(&self) -> Option<&Arc<ExecutionResult>> {
        match self {
            Dispatch::Executed(result) => Some(result),
            Dispatch::Declined => None,
        }
    }
}

/// Collaborators a session is built with
pub struct SessionOptions {
    pub confirmer: Arc<dyn Confirm>,

    /// Live output; ignored when `output.stream` is off
    pub sink: Option<Arc<dyn OutputSink>>,

    /// Environment layer and `env` secret source
    pub environment: Arc<dyn VariableSource>,

    /// Where fork logs are written
    pub log_dir: PathBuf,

    /// Cancels whichever command or run is in flight
    pub interrupter: Interrupter,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            confirmer: Arc::new(AutoConfirm(false)),
            sink: None,
            environment: Arc::new(ProcessEnv),
            log_dir: default_log_dir(),
            interrupter: Interrupter::new(),
        }
    }
}

/// `~/.writ/logs`
pub fn default_log_dir() -> PathBuf {
    expand_home("~/.writ/logs")
}

pub struct Session {
    settings: Settings,
    secrets: Arc<SecretStore>,
    gate: SecurityGate,
    executor: Arc<Executor>,
    buffer: Arc<OutputBuffer>,
    resolver: VariableResolver,
    confirmer: Arc<dyn Confirm>,
    environment: Arc<dyn VariableSource>,
    log_dir: PathBuf,
    interrupter: Interrupter,
}

impl Session {
    /// Session with default collaborators
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        Self::new(settings, SessionOptions::default())
    }

    /// Validate settings, load secrets and wire everything up
    pub fn new(settings: Settings, options: SessionOptions) -> Result<Self, ConfigError> {
        settings.validate()?;

        let secrets = Arc::new(SecretStore::new());
        let loaded = secrets.load(&SecretLoadPlan::from_settings(&settings)?, options.environment.as_ref())?;
        info!("Loaded {} secret(s)", loaded);

        let gate = SecurityGate::new(Arc::new(ModeState::new(settings.security_mode()?)));

        let mut executor =
            Executor::new(settings.writ.shell.clone(), secrets.clone()).with_default_timeout(settings.default_timeout());
        if settings.output.stream {
            if let Some(sink) = options.sink {
                executor = executor.with_sink(sink);
            }
        }

        let resolver = VariableResolver::new(settings.variables(), secrets.clone())
            .with_environment(options.environment.clone());

        Ok(Self {
            buffer: Arc::new(OutputBuffer::new(settings.output.buffer_size)),
            settings,
            secrets,
            gate,
            executor: Arc::new(executor),
            resolver,
            confirmer: options.confirmer,
            environment: options.environment,
            log_dir: options.log_dir,
            interrupter: options.interrupter,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn secrets(&self) -> &Arc<SecretStore> {
        &self.secrets
    }

    pub fn buffer(&self) -> &Arc<OutputBuffer> {
        &self.buffer
    }

    pub fn mode(&self) -> SecurityMode {
        self.gate.mode()
    }

    /// Switch the security mode, returning the previous one
    pub fn set_mode(&self, mode: SecurityMode) -> SecurityMode {
        self.gate.set_mode(mode)
    }

    /// Run a named command, optionally with operator-supplied arguments
    ///
    /// Extra arguments are raw shell text and are only accepted when shell
    /// escape is permitted.
    pub async fn run_command(
        &self,
        invocation: &Invocation,
        extra_args: Option<&str>,
    ) -> Result<Dispatch, DispatchError> {
        // Read the mode once for the whole dispatch
        let shell_allowed = self.gate.permit(GatedAction::ShellEscape);

        let extra_args = extra_args.map(str::trim).filter(|a| !a.is_empty());
        if extra_args.is_some() && !shell_allowed {
            warn!("Rejected extra arguments for '{}' in strict mode", invocation.name);
            return Err(DispatchError::ShellEscapeDenied);
        }

        let mut command = self.resolver.resolve(&invocation.command, &HashMap::new())?;
        if let Some(args) = extra_args {
            command.push(' ');
            command.push_str(args);
        }
        self.dispatch(invocation, &command).await
    }

    /// Run raw shell text typed by the operator
    pub async fn shell_escape(&self, command: &str) -> Result<Dispatch, DispatchError> {
        self.run_shell(&Invocation::new("shell", command)).await
    }

    /// Run raw shell text with the invocation's env, timeout and confirmation
    pub async fn run_shell(&self, invocation: &Invocation) -> Result<Dispatch, DispatchError> {
        if !self.gate.permit(GatedAction::ShellEscape) {
            warn!("Shell escape denied in {} mode", self.gate.mode());
            return Err(DispatchError::ShellEscapeDenied);
        }
        let command = self.resolver.resolve(&invocation.command, &HashMap::new())?;
        self.dispatch(invocation, &command).await
    }

    async fn dispatch(&self, invocation: &Invocation, command: &str) -> Result<Dispatch, DispatchError> {
        if invocation.confirm {
            let prompt = format!("Run '{}': {}?", invocation.name, self.secrets.mask_all(command));
            if !self.confirmer.confirm(&prompt) {
                info!("Declined: {}", invocation.name);
                return Ok(Dispatch::Declined);
            }
        }

        let armed = self.interrupter.arm();
        let options = RunOptions {
            timeout: invocation.timeout,
            env: invocation.env.clone(),
            cancel: Some(armed.token().clone()),
        };
        let result = Arc::new(self.executor.run(command, &options).await?);
        if self.settings.output.capture {
            self.buffer.push(result.clone());
        }
        Ok(Dispatch::Executed(result))
    }

    /// The `n`-th most recent result, 1 being the latest
    pub fn replay(&self, n: usize) -> Result<Arc<ExecutionResult>, BufferError> {
        self.buffer.get(n)
    }

    /// Configuration variables and secret names, masked for display
    pub fn variables(&self) -> Vec<VariableEntry> {
        self.resolver
            .listing(&HashMap::new(), self.settings.secrets.mask_in_output)
    }

    /// Like [`Session::variables`] but non-secret values are shown as-is
    pub fn variables_unmasked(&self) -> Vec<VariableEntry> {
        self.resolver.listing(&HashMap::new(), false)
    }

    pub fn interrupter(&self) -> &Interrupter {
        &self.interrupter
    }

    /// Pick up changed settings without restarting
    ///
    /// Shell, buffer and stream settings keep their original values. The
    /// configuration layer is replaced, secrets are re-read (values already
    /// masked stay masked), and the mode is left as the operator set it.
    pub fn reload(&mut self, settings: Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        let loaded = self
            .secrets
            .load(&SecretLoadPlan::from_settings(&settings)?, self.environment.as_ref())?;
        self.resolver = self.resolver.with_config(settings.variables());

        let mut settings = settings;
        settings.writ = self.settings.writ.clone();
        settings.output = self.settings.output.clone();
        self.settings = settings;
        info!("Config reloaded ({} secret(s) read)", loaded);
        Ok(())
    }

    /// A pipeline runner sharing this session's executor, buffer and gate
    pub fn runner(&self) -> PipelineRunner {
        PipelineRunner::new(
            self.executor.clone(),
            self.resolver.clone(),
            self.gate.clone(),
            self.buffer.clone(),
        )
        .with_confirmer(self.confirmer.clone())
    }

    pub async fn run_pipeline(
        &self,
        definition: &PipelineDefinition,
        extra_vars: HashMap<String, String>,
    ) -> Result<RunOutcome, PipelineError> {
        self.run_pipeline_with(self.runner(), definition, extra_vars).await
    }

    /// Run on a prepared runner (e.g. one with event handlers), interruptible
    /// through the session's [`Interrupter`]
    pub async fn run_pipeline_with(
        &self,
        runner: PipelineRunner,
        definition: &PipelineDefinition,
        extra_vars: HashMap<String, String>,
    ) -> Result<RunOutcome, PipelineError> {
        let armed = self.interrupter.arm();
        runner
            .with_cancel(armed.token().clone())
            .run_pipeline(definition, extra_vars)
            .await
    }

    /// Start a script in the background with its output logged
    pub async fn fork(&self, name: &str, script: &Path) -> Result<ForkHandle, ExecutionError> {
        self.executor.fork(name, script, &self.log_dir).await
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn fork_logs(&self) -> Result<Vec<ForkLogSummary>, LogError> {
        fork::list_fork_logs(&self.log_dir)
    }

    /// Masked contents of the fork log whose id starts with `prefix`
    pub fn fork_log(&self, prefix: &str) -> Result<(PathBuf, String), LogError> {
        let path = fork::find_fork_log(&self.log_dir, prefix)?;
        let content = fork::read_fork_log(&path, &self.secrets)?;
        Ok((path, content))
    }
}
