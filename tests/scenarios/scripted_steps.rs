//! Scenario: steps implemented in Rust through `ScriptedStep`

use crate::helpers::*;
use async_trait::async_trait;
use writ::core::{
    FailurePolicy, PipelineDefinition, RunStatus, ScriptError, ScriptedStep, Step, StepContext,
};
use writ::execution::RunEvent;

/// Polls a health command until it reports ready
struct WaitUntilHealthy {
    attempts: usize,
}

#[async_trait]
impl ScriptedStep for WaitUntilHealthy {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), ScriptError> {
        for attempt in 1..=self.attempts {
            let probe = ctx.run("echo ready").await?;
            if probe.stdout().trim() == "ready" {
                ctx.log(format!("healthy after {} attempt(s)", attempt));
                ctx.set_var("health", "ok");
                return Ok(());
            }
        }
        Err(ScriptError::failed("service never became healthy"))
    }
}

/// Builds a release tag from several commands
struct TagRelease;

#[async_trait]
impl ScriptedStep for TagRelease {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), ScriptError> {
        let major = ctx.run("echo 2").await?;
        let minor = ctx.run("echo 7").await?;
        let tag = format!("v{}.{}", major.stdout().trim(), minor.stdout().trim());
        let token = ctx.var("DEPLOY_TOKEN").unwrap_or_default();
        ctx.log(format!("tagging {} with token {}", tag, token));
        ctx.set_var("tag", tag);
        Ok(())
    }
}

/// Always rejects the release
struct Gatekeeper;

#[async_trait]
impl ScriptedStep for Gatekeeper {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), ScriptError> {
        let target = ctx.var("target").unwrap_or_default();
        Err(ScriptError::failed(format!("releases to {} are frozen", target)))
    }
}

/// Resolves a variable nobody defined
struct NeedsMissingVar;

#[async_trait]
impl ScriptedStep for NeedsMissingVar {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<(), ScriptError> {
        let command = ctx.resolve("echo ${missing_value}")?;
        ctx.run(&command).await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_scripted_steps_feed_later_shell_steps() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("release")
        .with_step(Step::scripted("wait", WaitUntilHealthy { attempts: 3 }))
        .with_step(Step::scripted("tag", TagRelease))
        .with_step(Step::shell("publish", "echo publishing ${tag} health=${health}"));

    let (outcome, events) = harness.run_recording(&definition).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(step_stdout(&outcome, "publish"), "publishing v2.7 health=ok");

    let tag = outcome.step("tag").unwrap();
    assert_eq!(tag.results.len(), 2);
    assert_eq!(tag.logs.len(), 1);
    assert!(tag.logs[0].starts_with("tagging v2.7"));
    assert_eq!(tag.logs[0], "tagging v2.7 with token ***");

    assert!(events.iter().any(|e| matches!(e,
        RunEvent::StepLog { step, message } if step == "wait" && message == "healthy after 1 attempt(s)")));
    assert!(events.iter().any(|e| matches!(e,
        RunEvent::StepStarted { step, command: None } if step == "tag")));
}

#[tokio::test]
async fn test_scripted_failure_follows_policy() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("release")
        .with_step(Step::scripted("gate", Gatekeeper).on_failure(FailurePolicy::Continue))
        .with_step(Step::shell("after", "echo still here"))
        .with_step(Step::scripted("gate-again", Gatekeeper))
        .with_step(Step::shell("never", "echo never"));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_step_failed(&outcome, "gate", "releases to staging are frozen");
    assert_step_succeeded(&outcome, "after");
    assert_eq!(outcome.aborted_at.as_deref(), Some("gate-again"));
    assert!(outcome.step("never").is_none());
}

#[tokio::test]
async fn test_unresolved_variable_fails_only_the_step() {
    let harness = Harness::open();
    let definition = PipelineDefinition::new("p")
        .with_step(Step::scripted("needs", NeedsMissingVar).on_failure(FailurePolicy::Continue))
        .with_step(Step::shell("next", "echo next"));

    let outcome = harness.run(&definition).await;

    assert_eq!(outcome.status, RunStatus::CompletedWithFailures);
    assert_step_failed(&outcome, "needs", "missing_value");
    assert!(outcome.step("needs").unwrap().results.is_empty());
    assert_step_succeeded(&outcome, "next");
}
