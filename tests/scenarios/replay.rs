//! Scenario: the replay buffer keeps the most recent results

use crate::helpers::*;
use std::sync::Arc;
use writ::core::{BufferError, PipelineDefinition, Step};

const SMALL_BUFFER: &str = "writ:\n  mode: open\noutput:\n  buffer_size: 2\nsecrets:\n  sources: []\n";

#[tokio::test]
async fn test_buffer_of_two_drops_the_oldest() {
    let harness = Harness::new(SMALL_BUFFER);
    for word in ["first", "second", "third"] {
        harness.session.shell_escape(&format!("echo {}", word)).await.unwrap();
    }

    assert_eq!(harness.session.replay(1).unwrap().stdout().trim(), "third");
    assert_eq!(harness.session.replay(2).unwrap().stdout().trim(), "second");
    assert!(matches!(harness.session.replay(3), Err(BufferError::NotFound { .. })));
    assert!(matches!(harness.session.replay(0), Err(BufferError::NotFound { .. })));
}

#[tokio::test]
async fn test_pipeline_results_are_replayable() {
    let harness = Harness::new(SMALL_BUFFER);
    let definition = PipelineDefinition::new("p")
        .with_step(Step::shell("a", "echo a"))
        .with_step(Step::shell("b", "echo b; exit 1"));

    let outcome = harness.run(&definition).await;

    let last = harness.session.replay(1).unwrap();
    assert!(Arc::ptr_eq(&last, outcome.step("b").unwrap().last_result().unwrap()));
    assert_eq!(last.exit_code(), 1);
    assert_eq!(harness.session.replay(2).unwrap().stdout().trim(), "a");
}

#[tokio::test]
async fn test_replay_is_masked() {
    let harness = Harness::open();
    harness.session.shell_escape(&format!("echo {}", DEPLOY_TOKEN)).await.unwrap();
    let replayed = harness.session.replay(1).unwrap();
    assert_eq!(replayed.stdout().trim(), "***");
    assert_eq!(replayed.command(), "echo ***");
}
