use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use writ::cli::commands::{ExecCommand, ForkCommand, LogsAction, LogsCommand, RunCommand, ShellCommand, VarsCommand};
use writ::cli::output::*;
use writ::cli::terminal_output::{TerminalConfirm, TerminalSink};
use writ::cli::{Cli, Command};
use writ::core::config::{expand_home, Settings};
use writ::core::{DispatchError, Invocation, RunOutcome, SecurityMode, StepStatus};
use writ::execution::{fork_finished, ExecutionResult, Interrupter, OutputSink};
use writ::session::{default_log_dir, Dispatch, Session, SessionOptions};

const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);
const STEP_OUTPUT_LINES: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")?;

    let settings = load_settings(cli.config.as_deref())?;

    let interrupter = Interrupter::new();
    let on_interrupt = interrupter.clone();
    let interactive = matches!(cli.command, Command::Shell(_));
    tokio::spawn(async move {
        // An interrupt cancels the running command; with nothing running it
        // exits, except at the shell prompt
        while tokio::signal::ctrl_c().await.is_ok() {
            if on_interrupt.interrupt() {
                continue;
            }
            if !interactive {
                std::process::exit(130);
            }
            eprintln!("\n{} Type 'exit' to quit", INFO);
        }
    });

    let sink: Option<Arc<dyn OutputSink>> = if cli.json {
        None
    } else {
        Some(Arc::new(TerminalSink::new(true)))
    };
    let options = SessionOptions {
        confirmer: Arc::new(TerminalConfirm),
        sink,
        log_dir: cli.log_dir.as_deref().map(expand_home).unwrap_or_else(default_log_dir),
        interrupter,
        ..SessionOptions::default()
    };
    let session = Session::new(settings, options).context("Failed to start session")?;

    match &cli.command {
        Command::Exec(cmd) => exec(&session, cmd, cli.json).await?,
        Command::Run(cmd) => run(&session, cmd, cli.json).await?,
        Command::Shell(cmd) => shell(session, cmd, cli.config.as_deref()).await?,
        Command::Vars(cmd) => show_vars(&session, cmd, cli.json)?,
        Command::Mode(_) => show_mode(&session, cli.json)?,
        Command::Fork(cmd) => fork(&session, cmd, cli.json).await?,
        Command::Logs(cmd) => logs(&session, cmd, cli.json).await?,
    }

    Ok(())
}

fn settings_path(config: Option<&str>) -> Option<PathBuf> {
    match config {
        Some(path) => Some(expand_home(path)),
        None => {
            let path = expand_home("~/.writ/settings.yaml");
            path.exists().then_some(path)
        }
    }
}

fn load_settings(config: Option<&str>) -> Result<Settings> {
    match settings_path(config) {
        Some(path) => Settings::from_file(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(Settings::default()),
    }
}

async fn exec(session: &Session, cmd: &ExecCommand, json: bool) -> Result<()> {
    let mut invocation = Invocation::new("exec", cmd.command.join(" "));
    for (key, value) in &cmd.env {
        invocation = invocation.with_env(key, value);
    }
    if let Some(secs) = cmd.timeout {
        invocation = invocation.with_timeout(Duration::from_secs(secs));
    }
    if cmd.confirm {
        invocation = invocation.requiring_confirmation();
    }

    let spinner = (!json && !session.settings().output.stream).then(|| create_spinner("Running..."));
    let dispatch = session.run_shell(&invocation).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let result = match dispatch.context("Command failed to run")? {
        Dispatch::Executed(result) => result,
        Dispatch::Declined => {
            println!("{} Not confirmed, nothing was run", WARN);
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(result.as_ref())?);
    } else {
        if !session.settings().output.stream {
            print_captured(&result);
        }
        eprintln!("{}", format_result_line(&result));
    }

    if !result.success() {
        std::process::exit(result.exit_code());
    }
    Ok(())
}

async fn run(session: &Session, cmd: &RunCommand, json: bool) -> Result<()> {
    let definition = cmd.definition()?;

    let runner = session.runner();
    if !json {
        runner.add_event_handler(|event| println!("{}", format_run_event(&event)));
    }
    let outcome = session
        .run_pipeline_with(runner, &definition, cmd.variables())
        .await
        .with_context(|| format!("Pipeline '{}' could not run", definition.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_run_summary(&outcome, !session.settings().output.stream);
    }

    if !outcome.status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_run_summary(outcome: &RunOutcome, show_output: bool) {
    println!();
    println!(
        "{} {}: {}",
        INFO,
        style(&outcome.pipeline_name).bold(),
        format_run_status(outcome.status)
    );
    for step in &outcome.steps {
        let detail = match &step.status {
            StepStatus::Succeeded => String::new(),
            StepStatus::Skipped { reason } | StepStatus::Failed { reason } => format!(" ({})", reason),
        };
        println!("  {} {}{}", format_step_status(&step.status), step.name, style(detail).dim());

        if !show_output {
            continue;
        }
        for result in &step.results {
            // Failures are usually explained on stderr
            let text = if step.status.is_failure() && !result.stderr().trim().is_empty() {
                result.stderr()
            } else {
                result.stdout()
            };
            if !text.trim().is_empty() {
                println!("{}", style(format_output(text.trim_end(), STEP_OUTPUT_LINES)).dim());
            }
        }
    }
    if let Some(step) = &outcome.aborted_at {
        println!("{} Stopped at '{}'", WARN, step);
    }
}

fn print_captured(result: &ExecutionResult) {
    print!("{}", result.stdout());
    if !result.stderr().is_empty() {
        eprint!("{}", style(result.stderr()).dim());
    }
}

async fn shell(mut session: Session, cmd: &ShellCommand, config: Option<&str>) -> Result<()> {
    if let Some(mode) = &cmd.mode {
        let mode: SecurityMode = mode.parse().context("Invalid --mode")?;
        session.set_mode(mode);
    }

    println!(
        "{} writ shell ({} mode). Commands: last [n], mode [open|strict], vars, reload, exit",
        INFO,
        format_mode(session.mode())
    );

    let stdin = io::stdin();
    loop {
        print!("{} ", style("writ>").cyan());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match word {
            "" => continue,
            "exit" | "quit" => break,
            "last" => {
                let n = if rest.is_empty() { 1 } else { rest.parse().unwrap_or(0) };
                match session.replay(n) {
                    Ok(result) => {
                        println!("{}", format_replay_header(&result));
                        print_captured(&result);
                    }
                    Err(e) => println!("{} {}", WARN, e),
                }
            }
            "mode" if rest.is_empty() => println!("{} Mode: {}", INFO, format_mode(session.mode())),
            "mode" => match rest.parse::<SecurityMode>() {
                Ok(mode) => {
                    let previous = session.set_mode(mode);
                    println!("{} Mode: {} -> {}", INFO, format_mode(previous), format_mode(mode));
                }
                Err(e) => println!("{} {}", WARN, e),
            },
            "vars" => {
                for entry in session.variables() {
                    println!("{}", format_variable(&entry));
                }
            }
            "reload" => match load_settings(config).and_then(|s| Ok(session.reload(s)?)) {
                Ok(()) => println!("{} Config reloaded", CHECK),
                Err(e) => println!("{} {:#}", CROSS, e),
            },
            _ => {
                let command = line.strip_prefix('!').unwrap_or(line);
                match session.shell_escape(command).await {
                    Ok(dispatch) => {
                        if let Some(result) = dispatch.result() {
                            if !session.settings().output.stream {
                                print_captured(result);
                            }
                            println!("{}", format_result_line(result));
                        }
                    }
                    Err(DispatchError::ShellEscapeDenied) => {
                        println!("{} Shell commands are disabled in strict mode", WARN)
                    }
                    Err(e) => println!("{} {}", CROSS, e),
                }
            }
        }
    }

    Ok(())
}

fn show_vars(session: &Session, cmd: &VarsCommand, json: bool) -> Result<()> {
    let entries = if cmd.unmasked {
        session.variables_unmasked()
    } else {
        session.variables()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{} No variables defined", INFO);
        return Ok(());
    }
    println!("{} Variables:", INFO);
    for entry in &entries {
        println!("{}", format_variable(entry));
    }
    Ok(())
}

fn show_mode(session: &Session, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "mode": session.mode() }));
    } else {
        println!("{} Mode: {}", INFO, format_mode(session.mode()));
    }
    Ok(())
}

async fn fork(session: &Session, cmd: &ForkCommand, json: bool) -> Result<()> {
    let script = Path::new(&cmd.script);
    let name = match &cmd.name {
        Some(name) => name.clone(),
        None => script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| cmd.script.clone()),
    };

    let handle = session.fork(&name, script).await.context("Failed to fork script")?;
    let id = handle.id;
    let log_path = handle.log_path.clone();

    if json {
        println!(
            "{}",
            serde_json::json!({ "id": id, "name": name, "log": log_path, "pid": handle.pid })
        );
    } else {
        println!("{} Forked {} ({})", ROCKET, style(&name).bold(), style(id).dim());
        println!("  Log: {}", style(log_path.display()).dim());
    }

    if cmd.wait {
        let termination = handle.wait().await.context("Failed to wait for forked script")?;
        if !json {
            println!("{} {} finished: {}", INFO, name, format_termination(termination));
        }
        if !termination.is_success() {
            std::process::exit(termination.code());
        }
    }
    Ok(())
}

async fn logs(session: &Session, cmd: &LogsCommand, json: bool) -> Result<()> {
    match &cmd.action {
        LogsAction::List => {
            let summaries = session.fork_logs()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("{} No fork logs in {}", INFO, session.log_dir().display());
            } else {
                for summary in &summaries {
                    println!("{}", format_fork_summary(summary));
                }
            }
        }
        LogsAction::Tail { id, follow } => {
            let (_, mut content) = session.fork_log(id)?;
            print!("{}", content);
            let mut printed = content.len();

            while *follow && !fork_finished(&content) {
                tokio::time::sleep(FOLLOW_INTERVAL).await;
                content = session.fork_log(id)?.1;
                if content.len() < printed {
                    bail!("Fork log {} was truncated", id);
                }
                if let Some(fresh) = content.get(printed..) {
                    print!("{}", fresh);
                    io::stdout().flush()?;
                }
                printed = content.len();
            }
        }
    }
    Ok(())
}
