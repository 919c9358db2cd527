//! Scenario: strict and open modes

use crate::helpers::*;
use writ::core::{DispatchError, Invocation, PipelineDefinition, RunStatus, SecurityMode, Step};
use writ::session::Dispatch;

const STRICT_SETTINGS: &str = r#"
writ:
  mode: strict
secrets:
  sources: [env]
  env_keys: [DEPLOY_TOKEN]
variables:
  service: billing
"#;

#[tokio::test]
async fn test_strict_mode_blocks_raw_shell_only() {
    let harness = Harness::new(STRICT_SETTINGS);
    assert_eq!(harness.session.mode(), SecurityMode::Strict);

    assert!(matches!(
        harness.session.shell_escape("echo hi").await,
        Err(DispatchError::ShellEscapeDenied)
    ));

    let restart = Invocation::new("restart", "echo restarting ${service}");
    let dispatch = harness.session.run_command(&restart, None).await.unwrap();
    assert_eq!(dispatch.result().unwrap().stdout().trim(), "restarting billing");

    assert!(matches!(
        harness.session.run_command(&restart, Some("&& cat /etc/passwd")).await,
        Err(DispatchError::ShellEscapeDenied)
    ));

    let definition = PipelineDefinition::new("p").with_step(Step::shell("declared", "echo declared"));
    let outcome = harness.run(&definition).await;
    assert_eq!(outcome.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_switching_modes_takes_effect_immediately() {
    let harness = Harness::new(STRICT_SETTINGS);

    assert_eq!(harness.session.set_mode(SecurityMode::Open), SecurityMode::Strict);
    let dispatch = harness.session.shell_escape("echo now allowed").await.unwrap();
    assert!(matches!(dispatch, Dispatch::Executed(ref r) if r.stdout().trim() == "now allowed"));

    let restart = Invocation::new("restart", "echo restarting");
    let with_args = harness.session.run_command(&restart, Some("--force")).await.unwrap();
    assert_eq!(with_args.result().unwrap().stdout().trim(), "restarting --force");

    harness.session.set_mode(SecurityMode::Strict);
    assert!(harness.session.shell_escape("echo again").await.is_err());
}
