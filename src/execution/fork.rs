//! Background script runs with log capture
//!
//! A forked script writes its combined output straight into
//! `<log_dir>/<uuid>.log`, framed by a header and a trailer:
//!
//! ```text
//! --- FORK: nightly ---
//! Started: 2024-05-01T12:00:00
//! Script: /opt/jobs/nightly.sh
//! PID: 4242
//! Log: /var/log/writ/0d9e...log
//! ---
//! ...script output...
//!
//! ---
//! Finished: 2024-05-01T12:03:10
//! Exit code: 0
//! Duration: 190s
//! ---
//! ```
//!
//! The trailer is written by a wrapping shell, so it appears even when the
//! process that forked the script has already exited. Secrets are injected
//! into the environment but the file itself holds raw output; read it back
//! through [`read_fork_log`] to get masked text.

use crate::{
    core::error::{ExecutionError, LogError},
    execution::{executor::termination_of, Executor, Termination},
    variables::SecretStore,
};
use chrono::Local;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};
use uuid::Uuid;

const HEADER_PREFIX: &str = "--- FORK: ";
const TRAILER_MARKER: &str = "\n---\nFinished: ";

/// Runs `$1` with the shell in `$0`, then appends the trailer
const WRAPPER: &str = r#"start=$(date +%s)
"$0" "$1"
code=$?
end=$(date +%s)
printf '\n---\nFinished: %s\nExit code: %s\nDuration: %ss\n---\n' "$(date +%Y-%m-%dT%H:%M:%S)" "$code" "$((end - start))"
exit $code"#;

/// A script started by [`Executor::fork`]
#[derive(Debug)]
pub struct ForkHandle {
    pub id: Uuid,
    pub name: String,
    pub log_path: PathBuf,
    pub pid: Option<u32>,
    child: Child,
}

impl ForkHandle {
    /// Wait for the script to finish
    pub async fn wait(mut self) -> std::io::Result<Termination> {
        let status = self.child.wait().await?;
        Ok(termination_of(status))
    }
}

impl Executor {
    /// Start `script` in the background, logging to a fresh file in `log_dir`
    ///
    /// The script runs in its own process group and is not killed when the
    /// handle is dropped.
    pub async fn fork(&self, name: &str, script: &Path, log_dir: &Path) -> Result<ForkHandle, ExecutionError> {
        let id = Uuid::new_v4();
        let log_path = log_dir.join(format!("{}.log", id));
        let log_err = |source| ExecutionError::LogFile {
            path: log_path.clone(),
            source,
        };

        fs::create_dir_all(log_dir).map_err(log_err)?;
        let mut log = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&log_path)
            .map_err(log_err)?;

        write!(
            log,
            "{}{} ---\nStarted: {}\nScript: {}\n",
            HEADER_PREFIX,
            name,
            Local::now().format("%Y-%m-%dT%H:%M:%S"),
            script.display()
        )
        .map_err(log_err)?;

        let stdout = log.try_clone().map_err(log_err)?;
        let stderr = log.try_clone().map_err(log_err)?;

        let mut cmd = Command::new(self.shell());
        cmd.arg("-c")
            .arg(WRAPPER)
            .arg(self.shell())
            .arg(script)
            .envs(self.secrets().as_env())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
            command: script.display().to_string(),
            shell: self.shell().to_string(),
            source,
        })?;
        let pid = child.id();

        // Fast scripts may already have written output above these lines.
        let pid_text = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());
        write!(log, "PID: {}\nLog: {}\n---\n", pid_text, log_path.display()).map_err(log_err)?;

        info!("Forked '{}' (pid {}) -> {}", name, pid_text, log_path.display());

        Ok(ForkHandle {
            id,
            name: name.to_string(),
            log_path,
            pid,
            child,
        })
    }
}

/// State of a forked run as recorded in its log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ForkStatus {
    Running,
    Exited { code: i32 },
}

/// Parsed header and trailer of one fork log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForkLogSummary {
    pub id: String,
    pub name: String,
    pub started: String,
    pub status: ForkStatus,
    pub path: PathBuf,
}

impl ForkLogSummary {
    fn parse(path: &Path, content: &str) -> Self {
        let mut summary = ForkLogSummary {
            id: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            name: "unknown".to_string(),
            started: "?".to_string(),
            status: ForkStatus::Running,
            path: path.to_path_buf(),
        };

        for line in content.lines() {
            if let Some(rest) = line.strip_prefix(HEADER_PREFIX) {
                summary.name = rest.trim_end_matches([' ', '-']).to_string();
            } else if let Some(rest) = line.strip_prefix("Started: ") {
                summary.started = rest.to_string();
            } else if let Some(rest) = line.strip_prefix("Exit code: ") {
                if let Ok(code) = rest.trim().parse() {
                    summary.status = ForkStatus::Exited { code };
                }
            }
        }
        summary
    }
}

fn log_files(dir: &Path) -> Result<Vec<PathBuf>, LogError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(LogError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            (path, modified)
        })
        .collect();

    files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(files.into_iter().map(|(path, _)| path).collect())
}

/// Summaries of every fork log in `dir`, newest first
///
/// A missing directory simply has no logs.
pub fn list_fork_logs(dir: &Path) -> Result<Vec<ForkLogSummary>, LogError> {
    let mut summaries = Vec::new();
    for path in log_files(dir)? {
        match fs::read_to_string(&path) {
            Ok(content) => summaries.push(ForkLogSummary::parse(&path, &content)),
            Err(e) => debug!("Skipping unreadable log {}: {}", path.display(), e),
        }
    }
    Ok(summaries)
}

/// Resolve a fork id prefix to exactly one log file
pub fn find_fork_log(dir: &Path, prefix: &str) -> Result<PathBuf, LogError> {
    let mut matches: Vec<PathBuf> = log_files(dir)?
        .into_iter()
        .filter(|path| {
            path.file_stem()
                .is_some_and(|stem| stem.to_string_lossy().starts_with(prefix))
        })
        .collect();

    match matches.len() {
        0 => Err(LogError::NotFound(prefix.to_string())),
        1 => Ok(matches.remove(0)),
        count => Err(LogError::Ambiguous {
            prefix: prefix.to_string(),
            count,
        }),
    }
}

/// Log contents with every secret value masked
pub fn read_fork_log(path: &Path, secrets: &SecretStore) -> Result<String, LogError> {
    let content = fs::read_to_string(path).map_err(|source| LogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(secrets.mask_all(&content))
}

/// Whether the trailer has been written
pub fn fork_finished(content: &str) -> bool {
    content.contains(TRAILER_MARKER)
}
