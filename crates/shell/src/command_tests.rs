use super::*;

#[tokio::test]
async fn runs_successful_command_and_captures_stdout() {
    let spec = CommandSpec::new("sh", std::env::temp_dir())
        .arg("-c")
        .arg("echo hello");
    let out = spec.run().await.unwrap();
    assert!(out.success());
    assert_eq!(out.stdout.trim(), "hello");
}

#[tokio::test]
async fn nonzero_exit_is_reported_not_errored() {
    let spec = CommandSpec::new("sh", std::env::temp_dir()).arg("-c").arg("exit 3");
    let out = spec.run().await.unwrap();
    assert_eq!(out.exit_code, 3);
}

#[tokio::test]
async fn timeout_kills_long_running_command() {
    let spec = CommandSpec::new("sh", std::env::temp_dir())
        .arg("-c")
        .arg("sleep 5")
        .timeout(std::time::Duration::from_millis(50));
    let err = spec.run().await.unwrap_err();
    assert!(matches!(err, ShellError::Timeout { .. }));
}

#[tokio::test]
async fn env_vars_are_visible_to_child() {
    let spec = CommandSpec::new("sh", std::env::temp_dir())
        .arg("-c")
        .arg("echo $RALPH_TEST_VAR")
        .env("RALPH_TEST_VAR", "present");
    let out = spec.run().await.unwrap();
    assert_eq!(out.stdout.trim(), "present");
}
