//! Scenario: `on_failure: continue` records the failure and keeps going

use crate::helpers::*;
use writ::core::{FailurePolicy, PipelineDefinition, RunStatus, Step};

#[tokio::test]
async fn test_continue_runs_later_steps() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("nightly")
        .with_step(Step::shell("lint", "exit 1").on_failure(FailurePolicy::Continue))
        .with_step(Step::shell("build", "echo built"))
        .with_step(Step::shell("report", "echo reported"));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::CompletedWithFailures);
    assert!(!outcome.status.is_success());
    assert!(outcome.aborted_at.is_none());
    assert_step_failed(&outcome, "lint", "exit code 1");
    assert_step_succeeded(&outcome, "build");
    assert_step_succeeded(&outcome, "report");
    assert_eq!(outcome.failed_steps(), vec!["lint"]);
}

#[tokio::test]
async fn test_abort_after_a_continued_failure() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("nightly")
        .with_step(Step::shell("lint", "exit 1").on_failure(FailurePolicy::Continue))
        .with_step(Step::shell("test", "exit 2"))
        .with_step(Step::shell("report", "echo reported"));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_eq!(outcome.aborted_at.as_deref(), Some("test"));
    assert_eq!(outcome.failed_steps(), vec!["lint", "test"]);
    assert!(outcome.step("report").is_none());
}
