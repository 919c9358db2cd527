//! Scenario: a failing step stops the run under the default policy

use crate::helpers::*;
use writ::core::{PipelineDefinition, RunStatus, Step};
use writ::execution::RunEvent;

/// check -> deploy -> notify, where deploy fails
fn release() -> PipelineDefinition {
    PipelineDefinition::new("release")
        .with_step(Step::shell("check", "echo checks passed"))
        .with_step(Step::shell("deploy", "echo deploying >&2; exit 3"))
        .with_step(Step::shell("notify", "echo notified"))
}

#[tokio::test]
async fn test_failed_deploy_aborts_before_notify() {
    let harness = Harness::open();
    let outcome = harness.run(&release()).await;

    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_eq!(outcome.aborted_at.as_deref(), Some("deploy"));
    assert_step_succeeded(&outcome, "check");
    assert_step_failed(&outcome, "deploy", "exit code 3");
    assert!(outcome.step("notify").is_none(), "notify must never be recorded");
    assert_execution_order(&outcome, &["check", "deploy"]);

    let deploy = outcome.step("deploy").unwrap().last_result().unwrap();
    assert_eq!(deploy.exit_code(), 3);
    assert_eq!(deploy.stderr().trim(), "deploying");
}

#[tokio::test]
async fn test_events_follow_the_run() {
    let harness = Harness::open();
    let (outcome, events) = harness.run_recording(&release()).await;
    assert_eq!(outcome.status, RunStatus::Aborted);

    assert!(matches!(
        events.first(),
        Some(RunEvent::PipelineStarted { total_steps: 3, pipeline_name, .. }) if pipeline_name == "release"
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::StepSucceeded { step } if step == "check")));
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::StepFailed { step, .. } if step == "deploy")));
    assert!(!events.iter().any(|e| matches!(e,
        RunEvent::StepStarted { step, .. } if step == "notify")));
    assert!(matches!(
        events.last(),
        Some(RunEvent::PipelineFinished { status: RunStatus::Aborted, execution_id }) if *execution_id == outcome.execution_id
    ));
}

#[tokio::test]
async fn test_clean_run_completes() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("release")
        .with_step(Step::shell("check", "true"))
        .with_step(Step::shell("deploy", "true"))
        .with_step(Step::shell("notify", "echo done"));

    let outcome = harness.run(&definition).await;
    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome.status.is_success());
    assert!(outcome.aborted_at.is_none());
    assert_execution_order(&outcome, &["check", "deploy", "notify"]);
    assert_eq!(step_stdout(&outcome, "notify"), "done");
}
