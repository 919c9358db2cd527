//! Shell command executor - runs one command with streaming capture

use crate::{
    core::error::ExecutionError,
    execution::{CancelToken, ExecutionResult, OutputSink, StreamKind, Termination},
    variables::SecretStore,
};
use chrono::Utc;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long reader tasks may keep draining after the process is gone.
/// Grandchildren can hold the pipes open past the child's exit; once the
/// grace runs out the whole process group is killed.
const READER_GRACE: Duration = Duration::from_secs(5);

/// Per-call execution options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Kill the process after this long (falls back to the executor default)
    pub timeout: Option<Duration>,

    /// Extra environment for the child, applied after secrets
    pub env: HashMap<String, String>,

    /// Interrupt the run when this token fires
    pub cancel: Option<CancelToken>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

/// Runs commands through the configured shell
///
/// A non-zero exit, a timeout or a cancellation all produce an
/// `ExecutionResult`; only a failure to start the process is an error.
pub struct Executor {
    shell: String,
    secrets: Arc<SecretStore>,
    sink: Option<Arc<dyn OutputSink>>,
    default_timeout: Option<Duration>,
    reader_grace: Duration,
}

impl Executor {
    pub fn new(shell: impl Into<String>, secrets: Arc<SecretStore>) -> Self {
        Self {
            shell: shell.into(),
            secrets,
            sink: None,
            default_timeout: None,
            reader_grace: READER_GRACE,
        }
    }

    /// Echo masked output lines to `sink` while commands run
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// How long output may stay open after the shell has exited
    pub fn with_reader_grace(mut self, grace: Duration) -> Self {
        self.reader_grace = grace;
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn secrets(&self) -> &Arc<SecretStore> {
        &self.secrets
    }

    /// Build a `<shell> -c <command>` invocation with secrets in its environment
    fn shell_command(&self, args: &[&str], env: &HashMap<String, String>) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.args(args)
            .envs(self.secrets.as_env())
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Run a command to completion
    pub async fn run(&self, command: &str, options: &RunOptions) -> Result<ExecutionResult, ExecutionError> {
        let masked_command = self.secrets.mask_all(command);
        let timeout = options.timeout.or(self.default_timeout);
        let started_at = Utc::now();

        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            info!("Not starting cancelled command: {}", masked_command);
            return Ok(ExecutionResult::new(
                masked_command,
                String::new(),
                String::new(),
                Termination::Cancelled,
                started_at,
                Utc::now(),
            ));
        }

        info!("Running: {}", masked_command);

        let mut child = self
            .shell_command(&["-c", command], &options.env)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                command: masked_command.clone(),
                shell: self.shell.clone(),
                source,
            })?;
        let pid = child.id();
        debug!("Spawned pid {:?} for: {}", pid, masked_command);

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = tokio::spawn(drain(
            child.stdout.take(),
            StreamKind::Stdout,
            self.secrets.clone(),
            self.sink.clone(),
            stdout_buf.clone(),
        ));
        let stderr_task = tokio::spawn(drain(
            child.stderr.take(),
            StreamKind::Stderr,
            self.secrets.clone(),
            self.sink.clone(),
            stderr_buf.clone(),
        ));

        let outcome = tokio::select! {
            biased;
            status = child.wait() => Outcome::Exited(status),
            _ = deadline(timeout) => Outcome::TimedOut(timeout.unwrap_or_default()),
            _ = cancellation(options.cancel.as_ref()) => Outcome::Cancelled,
        };

        let termination = match outcome {
            Outcome::Exited(Ok(status)) => termination_of(status),
            Outcome::Exited(Err(e)) => {
                warn!("Failed waiting on '{}': {}", masked_command, e);
                terminate(&mut child, pid).await;
                Termination::Exited { code: -1 }
            }
            Outcome::TimedOut(after) => {
                warn!("Timed out after {:?}: {}", after, masked_command);
                terminate(&mut child, pid).await;
                Termination::TimedOut {
                    timeout_ms: after.as_millis() as u64,
                }
            }
            Outcome::Cancelled => {
                warn!("Cancelled: {}", masked_command);
                terminate(&mut child, pid).await;
                Termination::Cancelled
            }
        };

        let (stdout_closed, stderr_closed) = tokio::join!(
            join_reader(stdout_task, self.reader_grace),
            join_reader(stderr_task, self.reader_grace)
        );
        if !(stdout_closed && stderr_closed) {
            warn!(
                "Output still open {:?} after exit, killing leftover processes: {}",
                self.reader_grace, masked_command
            );
            kill_group(pid);
        }

        let stdout = self.secrets.mask_all(&take_text(&stdout_buf));
        let stderr = self.secrets.mask_all(&take_text(&stderr_buf));
        let finished_at = Utc::now();

        info!("Finished ({}): {}", termination, masked_command);

        Ok(ExecutionResult::new(
            masked_command,
            stdout,
            stderr,
            termination,
            started_at,
            finished_at,
        ))
    }
}

/// Read a pipe line by line into `captured`, echoing masked lines to the sink
async fn drain<R>(
    reader: Option<R>,
    kind: StreamKind,
    secrets: Arc<SecretStore>,
    sink: Option<Arc<dyn OutputSink>>,
    captured: Arc<Mutex<Vec<u8>>>,
) where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if let Some(sink) = &sink {
                    let text = String::from_utf8_lossy(&line);
                    sink.on_line(kind, &secrets.mask_all(&text));
                }
                captured
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend_from_slice(&line);
            }
            Err(e) => {
                debug!("{:?} reader stopped: {}", kind, e);
                break;
            }
        }
    }
}

/// Wait up to `grace` for a reader to hit EOF; false if it had to be aborted
async fn join_reader(mut task: JoinHandle<()>, grace: Duration) -> bool {
    if tokio::time::timeout(grace, &mut task).await.is_err() {
        task.abort();
        return false;
    }
    true
}

fn take_text(buf: &Mutex<Vec<u8>>) -> String {
    let bytes = std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner()));
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn cancellation(cancel: Option<&CancelToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

pub(crate) fn termination_of(status: ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        return Termination::Exited { code };
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Termination::Signaled { signal };
        }
    }
    Termination::Exited { code: -1 }
}

/// SIGKILL every process in the child's group
///
/// The group outlives its leader, so this also reaches grandchildren after
/// the shell itself has exited.
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // The child leads its own group, so its pid is the group id.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!("killpg({}) failed: {}", pid, std::io::Error::last_os_error());
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kill the child's whole process group and reap it
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);

    if let Err(e) = child.start_kill() {
        debug!("start_kill failed: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap killed process: {}", e);
    }
}
