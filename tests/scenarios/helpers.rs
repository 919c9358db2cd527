//! Shared fixtures and assertions for scenario tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use writ::core::{PipelineDefinition, RunOutcome, Settings, StepStatus};
use writ::execution::{AutoConfirm, RunEvent};
use writ::session::{Session, SessionOptions};

pub const DEPLOY_TOKEN: &str = "tok-9f8e7d6c";

/// A session wired to a private log dir and a fake environment
pub struct Harness {
    pub session: Session,
    pub dir: TempDir,
}

impl Harness {
    /// Session from settings YAML; `DEPLOY_TOKEN` is loaded as a secret
    pub fn new(yaml: &str) -> Self {
        Self::with_confirm(yaml, true)
    }

    pub fn with_confirm(yaml: &str, confirm: bool) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let settings = Settings::from_yaml(yaml).expect("valid settings");
        let environment: HashMap<String, String> =
            HashMap::from([("DEPLOY_TOKEN".to_string(), DEPLOY_TOKEN.to_string())]);
        let options = SessionOptions {
            confirmer: Arc::new(AutoConfirm(confirm)),
            environment: Arc::new(environment),
            log_dir: dir.path().join("logs"),
            ..SessionOptions::default()
        };
        let session = Session::new(settings, options).expect("session");
        Self { session, dir }
    }

    pub fn open() -> Self {
        Self::new(OPEN_SETTINGS)
    }

    pub async fn run(&self, definition: &PipelineDefinition) -> RunOutcome {
        self.session
            .run_pipeline(definition, HashMap::new())
            .await
            .expect("pipeline should not hit a fatal error")
    }

    /// Run and collect every emitted event
    pub async fn run_recording(&self, definition: &PipelineDefinition) -> (RunOutcome, Vec<RunEvent>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let runner = self.session.runner();
        let sink = events.clone();
        runner.add_event_handler(move |event| sink.lock().unwrap().push(event));

        let outcome = runner
            .run_pipeline(definition, HashMap::new())
            .await
            .expect("pipeline should not hit a fatal error");
        let events = events.lock().unwrap().clone();
        (outcome, events)
    }
}

pub const OPEN_SETTINGS: &str = r#"
writ:
  mode: open
output:
  buffer_size: 10
secrets:
  sources: [env]
  env_keys: [DEPLOY_TOKEN]
variables:
  target: staging
  region: eu-west-1
"#;

/// Trimmed stdout of a step's last command
pub fn step_stdout(outcome: &RunOutcome, step: &str) -> String {
    outcome
        .step(step)
        .and_then(|s| s.last_result())
        .map(|r| r.stdout().trim().to_string())
        .unwrap_or_else(|| panic!("step '{}' has no result", step))
}

pub fn assert_step_succeeded(outcome: &RunOutcome, step: &str) {
    let status = &outcome
        .step(step)
        .unwrap_or_else(|| panic!("step '{}' not in outcome", step))
        .status;
    assert_eq!(status, &StepStatus::Succeeded, "step '{}'", step);
}

pub fn assert_step_failed(outcome: &RunOutcome, step: &str, reason_contains: &str) {
    match &outcome
        .step(step)
        .unwrap_or_else(|| panic!("step '{}' not in outcome", step))
        .status
    {
        StepStatus::Failed { reason } => assert!(
            reason.contains(reason_contains),
            "step '{}' failed with '{}', expected it to mention '{}'",
            step,
            reason,
            reason_contains
        ),
        other => panic!("step '{}' should have failed, was {:?}", step, other),
    }
}

pub fn assert_step_skipped(outcome: &RunOutcome, step: &str) {
    let status = &outcome
        .step(step)
        .unwrap_or_else(|| panic!("step '{}' not in outcome", step))
        .status;
    assert!(
        matches!(status, StepStatus::Skipped { .. }),
        "step '{}' should be skipped, was {:?}",
        step,
        status
    );
}

/// Steps that actually ran, in order
pub fn assert_execution_order(outcome: &RunOutcome, expected: &[&str]) {
    let executed: Vec<&str> = outcome
        .steps
        .iter()
        .filter(|s| s.status.was_executed())
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(executed, expected);
}
