// SPDX-License-Identifier: MIT

use super::*;
use std::path::Path;

#[tokio::test]
async fn fake_session_runner_defaults_to_bare_success() {
    let runner = FakeSessionRunner::new();
    let result = runner.run_agent(Path::new("/repo"), "ralph-plan", "do it", &RunOpts::default()).await.unwrap();
    assert!(result.success);
    assert_eq!(result.output, "");

    match &runner.calls()[0] {
        SessionCall::RunAgent { agent, prompt } => {
            assert_eq!(agent, "ralph-plan");
            assert_eq!(prompt, "do it");
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

#[tokio::test]
async fn fake_session_runner_replays_queued_results_in_order() {
    let runner = FakeSessionRunner::new();
    runner.push_result(SessionResult { success: true, session_id: Some("s1".into()), ..SessionResult::ok("first") });
    runner.push_result(SessionResult::ok("second"));

    let first = runner.run_agent(Path::new("/repo"), "ralph-plan", "p", &RunOpts::default()).await.unwrap();
    assert_eq!(first.output, "first");
    assert_eq!(first.session_id.as_deref(), Some("s1"));

    let second = runner
        .continue_session(Path::new("/repo"), "s1", "continue", &RunOpts::default())
        .await
        .unwrap();
    assert_eq!(second.output, "second");

    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn fake_session_runner_records_continue_command_calls() {
    let runner = FakeSessionRunner::new();
    runner
        .continue_command(Path::new("/repo"), "s1", "gh", &["pr".into(), "view".into()], &RunOpts::default())
        .await
        .unwrap();

    match &runner.calls()[0] {
        SessionCall::ContinueCommand { session_id, command, args } => {
            assert_eq!(session_id, "s1");
            assert_eq!(command, "gh");
            assert_eq!(args, &vec!["pr".to_string(), "view".to_string()]);
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

fn script_runner(body: &str) -> (tempfile::TempDir, ShellSessionRunner) {
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("agent.sh");
    std::fs::write(&script_path, format!("#!/bin/sh\n{body}\n")).unwrap();
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
    let runner = ShellSessionRunner::new("/bin/sh", vec![script_path.display().to_string()]);
    (dir, runner)
}

#[tokio::test]
async fn shell_session_runner_parses_stdout_as_session_result() {
    let (dir, runner) =
        script_runner(r#"echo '{"success":true,"session_id":"s9","output":"done","pr_url":null}'"#);
    let result = runner.run_agent(dir.path(), "ralph-plan", "do it", &RunOpts::default()).await.unwrap();
    assert!(result.success);
    assert_eq!(result.session_id.as_deref(), Some("s9"));
    assert_eq!(result.output, "done");
}

#[tokio::test]
async fn shell_session_runner_surfaces_nonzero_exit_as_unavailable() {
    let (dir, runner) = script_runner("echo boom 1>&2; exit 3");
    let err = runner.run_agent(dir.path(), "ralph-plan", "do it", &RunOpts::default()).await.unwrap_err();
    match err {
        SessionError::Unavailable(msg) => assert!(msg.contains("boom"), "got {msg}"),
        other => panic!("expected Unavailable, got {other:?}"),
    }
}
