//! Scenario: timeouts and cancellation stop steps and the run

use crate::helpers::*;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use writ::core::{FailurePolicy, PipelineDefinition, RunStatus, Step};
use writ::execution::{CancelToken, TIMEOUT_EXIT_CODE};

#[tokio::test]
async fn test_step_timeout_fails_the_step() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_step(Step::shell("hang", "sleep 10").with_timeout(Duration::from_millis(300)))
        .with_step(Step::shell("after", "echo after"));

    let started = Instant::now();
    let outcome = harness.run(&definition).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_step_failed(&outcome, "hang", "timed out");
    let result = outcome.step("hang").unwrap().last_result().unwrap();
    assert!(result.timed_out());
    assert_eq!(result.exit_code(), TIMEOUT_EXIT_CODE);
}

#[tokio::test]
async fn test_timed_out_step_can_continue() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_step(
            Step::shell("hang", "sleep 10")
                .with_timeout(Duration::from_millis(200))
                .on_failure(FailurePolicy::Continue),
        )
        .with_step(Step::shell("after", "echo after"));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::CompletedWithFailures);
    assert_step_succeeded(&outcome, "after");
}

#[tokio::test]
async fn test_configured_default_timeout_applies() {
    let harness = Harness::new("writ:\n  default_timeout_secs: 1\nsecrets:\n  sources: []\n");
    let definition = PipelineDefinition::new("p").with_step(Step::shell("hang", "sleep 10"));

    let started = Instant::now();
    let outcome = harness.run(&definition).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_step_failed(&outcome, "hang", "timed out after 1.0s");
}

#[tokio::test]
async fn test_cancel_aborts_even_with_continue() {
    let harness = Harness::open();
    let cancel = CancelToken::new();
    let runner = harness.session.runner().with_cancel(cancel.clone());
    let definition = PipelineDefinition::new("p")
        .with_step(Step::shell("long", "sleep 10").on_failure(FailurePolicy::Continue))
        .with_step(Step::shell("after", "echo after"));

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let outcome = runner.run_pipeline(&definition, HashMap::new()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_eq!(outcome.aborted_at.as_deref(), Some("long"));
    assert!(outcome.step("long").unwrap().last_result().unwrap().cancelled());
    assert!(outcome.step("after").is_none());
}

#[tokio::test]
async fn test_interrupted_run_leaves_the_next_run_alone() {
    let harness = Harness::open();
    let interrupter = harness.session.interrupter().clone();
    let long = PipelineDefinition::new("long").with_step(Step::shell("wait", "sleep 10"));

    let (outcome, interrupted) = tokio::join!(harness.run(&long), async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        interrupter.interrupt()
    });
    assert!(interrupted);
    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_eq!(outcome.aborted_at.as_deref(), Some("wait"));

    let quick = PipelineDefinition::new("quick").with_step(Step::shell("hello", "echo hello"));
    let outcome = harness.run(&quick).await;
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(step_stdout(&outcome, "hello"), "hello");
}
