//! Scenario: `${VAR}` substitution across layers, with secrets masked

use crate::helpers::*;
use std::collections::HashMap;
use writ::core::{PipelineDefinition, RunStatus, Step};

#[tokio::test]
async fn test_layers_resolve_in_order() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_variable("region", "us-east-2")
        .with_step(Step::shell("show", "echo ${target} ${region}"));

    let outcome = harness.run(&definition).await;

    // Run-local `region` shadows the configured one
    assert_eq!(step_stdout(&outcome, "show"), "staging us-east-2");
}

#[tokio::test]
async fn test_extra_vars_override_definition_defaults() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_variable("target", "qa")
        .with_step(Step::shell("show", "echo ${target}"));

    let extra = HashMap::from([("target".to_string(), "production".to_string())]);
    let outcome = harness.session.run_pipeline(&definition, extra).await.unwrap();

    assert_eq!(step_stdout(&outcome, "show"), "production");
}

#[tokio::test]
async fn test_secret_is_substituted_but_never_shown() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_step(Step::shell("auth", "echo token=${DEPLOY_TOKEN}"))
        .with_step(Step::shell("env", "echo from-env=$DEPLOY_TOKEN >&2"));

    let outcome = harness.run(&definition).await;
    assert_eq!(outcome.status, RunStatus::Completed);

    let auth = outcome.step("auth").unwrap().last_result().unwrap();
    assert_eq!(auth.stdout().trim(), "token=***");
    assert_eq!(auth.command(), "echo token=***");

    let env = outcome.step("env").unwrap().last_result().unwrap();
    assert_eq!(env.stderr().trim(), "from-env=***");

    let json = serde_json::to_string(&outcome).unwrap();
    assert!(!json.contains(DEPLOY_TOKEN));
}

#[tokio::test]
async fn test_step_env_reaches_the_child() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_step(Step::shell("env", "echo $RELEASE_CHANNEL").with_env("RELEASE_CHANNEL", "canary"));

    let outcome = harness.run(&definition).await;
    assert_eq!(step_stdout(&outcome, "env"), "canary");
}

#[tokio::test]
async fn test_unresolved_reference_fails_step_without_running() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_step(Step::shell("broken", "echo ${nope}"))
        .with_step(Step::shell("after", "echo after"));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_step_failed(&outcome, "broken", "nope");
    assert!(outcome.step("broken").unwrap().results.is_empty());
    assert!(harness.session.buffer().is_empty());
}
