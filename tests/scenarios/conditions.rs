//! Scenario: conditional steps

use crate::helpers::*;
use writ::core::{Condition, Expected, FailurePolicy, PipelineDefinition, PipelineSpec, RunStatus, Step};

#[tokio::test]
async fn test_rollback_runs_only_after_failure() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("deploy")
        .with_step(Step::shell("deploy", "exit 1").on_failure(FailurePolicy::Continue))
        .with_step(Step::shell("rollback", "echo rolled back").when(Condition::PreviousStep(Expected::Failed)))
        .with_step(Step::shell("celebrate", "echo yay").when(Condition::Step {
            name: "deploy".to_string(),
            expected: Expected::Succeeded,
        }));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::CompletedWithFailures);
    assert_step_succeeded(&outcome, "rollback");
    assert_eq!(step_stdout(&outcome, "rollback"), "rolled back");
    assert_step_skipped(&outcome, "celebrate");
    assert_eq!(outcome.skipped_steps(), vec!["celebrate"]);
}

#[tokio::test]
async fn test_skipped_step_counts_as_succeeded_for_prev_step() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_step(Step::shell("build", "true"))
        .with_step(Step::shell("hotfix", "echo hotfix").when(Condition::VariableEquals {
            name: "target".to_string(),
            value: "production".to_string(),
        }))
        .with_step(Step::shell("publish", "echo publish").when(Condition::PreviousStep(Expected::Succeeded)));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_step_skipped(&outcome, "hotfix");
    assert_step_succeeded(&outcome, "publish");
    assert_execution_order(&outcome, &["build", "publish"]);
}

#[tokio::test]
async fn test_prev_step_looks_only_at_the_immediately_preceding_step() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_step(Step::shell("a", "exit 1").on_failure(FailurePolicy::Continue))
        .with_step(Step::shell("b", "echo b").when(Condition::PreviousStep(Expected::Succeeded)))
        .with_step(Step::shell("c", "echo c").when(Condition::PreviousStep(Expected::Failed)))
        .with_step(Step::shell("d", "echo d").when(Condition::Step {
            name: "b".to_string(),
            expected: Expected::Succeeded,
        }));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::CompletedWithFailures);
    assert_step_failed(&outcome, "a", "exit code 1");
    assert_step_skipped(&outcome, "b");
    // b was skipped, which reads as succeeded, so a's failure is out of reach
    assert_step_skipped(&outcome, "c");
    assert_step_succeeded(&outcome, "d");
    assert_execution_order(&outcome, &["a", "d"]);
}

#[tokio::test]
async fn test_variable_condition_sees_config_and_run_values() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_variable("channel", "beta")
        .with_step(Step::shell("staging", "echo s").when(Condition::VariableEquals {
            name: "target".to_string(),
            value: "staging".to_string(),
        }))
        .with_step(Step::shell("beta", "echo b").when(Condition::VariableEquals {
            name: "channel".to_string(),
            value: "beta".to_string(),
        }))
        .with_step(Step::shell("ghost", "echo g").when(Condition::VariableEquals {
            name: "undefined_thing".to_string(),
            value: "".to_string(),
        }));

    let outcome = harness.run(&definition).await;

    assert_step_succeeded(&outcome, "staging");
    assert_step_succeeded(&outcome, "beta");
    assert_step_skipped(&outcome, "ghost");
}

#[tokio::test]
async fn test_conditions_from_decoded_definition() {
    let spec: PipelineSpec = serde_yaml::from_str(
        r#"
name: guarded
steps:
  - name: probe
    run: "exit 1"
    on_failure: continue
  - name: recover
    run: "echo recovering"
    when:
      - step.probe: failed
  - name: skip-me
    run: "echo nope"
    when:
      - prev_step: failed
"#,
    )
    .unwrap();
    let definition = PipelineDefinition::from_spec(&spec).unwrap();

    let outcome = Harness::open().run(&definition).await;

    assert_step_failed(&outcome, "probe", "exit code 1");
    assert_step_succeeded(&outcome, "recover");
    assert_step_skipped(&outcome, "skip-me");
}

#[tokio::test]
async fn test_declined_confirmation_skips_step() {
    let harness = Harness::with_confirm(OPEN_SETTINGS, false);
    let definition = PipelineDefinition::new("p")
        .with_step(Step::shell("wipe", "echo wiped").requiring_confirmation())
        .with_step(Step::shell("after", "echo after"));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_step_skipped(&outcome, "wipe");
    assert_step_succeeded(&outcome, "after");
}
