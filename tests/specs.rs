// SPDX-License-Identifier: MIT

//! Workspace-level black-box specs for the `ralph` CLI binary, exercising
//! it the way an operator would: against a real `RALPH_STATE_DIR` on disk,
//! through `assert_cmd`, with no knowledge of the crate internals.

use std::path::Path;

use assert_cmd::Command;
use serial_test::serial;
use tempfile::TempDir;

fn cli(state_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ralph").expect("ralph binary built");
    cmd.env("RALPH_STATE_DIR", state_dir);
    cmd
}

fn control_json(state_dir: &Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(state_dir.join("control.json")).expect("control.json written");
    serde_json::from_str(&raw).expect("control.json is valid JSON")
}

#[test]
#[serial]
fn status_on_a_fresh_state_dir_shows_running_and_no_tasks() {
    let dir = TempDir::new().expect("tempdir");
    cli(dir.path()).arg("status").assert().success().stdout(predicates::str::contains("mode: running")).stdout(
        predicates::str::contains("tasks: 0"),
    );
}

#[test]
#[serial]
fn enqueue_then_status_reports_one_queued_task() {
    let dir = TempDir::new().expect("tempdir");
    cli(dir.path())
        .args(["enqueue", "acme/widgets", "acme/widgets#42"])
        .assert()
        .success()
        .stdout(predicates::str::contains("queued acme/widgets#42"));

    cli(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicates::str::contains("tasks: 1"))
        .stdout(predicates::str::contains("queued: 1"));
}

#[test]
#[serial]
fn enqueueing_the_same_issue_twice_stays_a_single_task() {
    let dir = TempDir::new().expect("tempdir");
    for _ in 0..2 {
        cli(dir.path()).args(["enqueue", "acme/widgets", "acme/widgets#7"]).assert().success();
    }
    cli(dir.path()).arg("status").assert().success().stdout(predicates::str::contains("tasks: 1"));
}

#[test]
#[serial]
fn drain_flips_control_file_mode_without_touching_queue() {
    let dir = TempDir::new().expect("tempdir");
    cli(dir.path()).arg("drain").assert().success().stdout(predicates::str::contains("draining"));

    let state = control_json(dir.path());
    assert_eq!(state["mode"], "draining");
    assert_eq!(state["version"], 1);

    cli(dir.path()).arg("status").assert().success().stdout(predicates::str::contains("mode: draining"));
}

#[test]
#[serial]
fn pause_at_checkpoint_round_trips_through_status() {
    let dir = TempDir::new().expect("tempdir");
    cli(dir.path())
        .args(["pause", "--checkpoint", "pr_ready", "--timeout-ms", "5000"])
        .assert()
        .success()
        .stdout(predicates::str::contains("pr_ready"));

    let state = control_json(dir.path());
    assert_eq!(state["pause_requested"], true);
    assert_eq!(state["pause_at_checkpoint"], "pr_ready");
    assert_eq!(state["drain_timeout_ms"], 5000);

    cli(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicates::str::contains("pause requested at checkpoint: pr_ready"));
}

#[test]
#[serial]
fn pause_rejects_an_unrecognized_checkpoint_name() {
    let dir = TempDir::new().expect("tempdir");
    cli(dir.path())
        .args(["pause", "--checkpoint", "not-a-real-checkpoint"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("unrecognized checkpoint"));

    // no control.json should have been written on the rejected attempt
    assert!(!dir.path().join("control.json").exists());
}

#[test]
#[serial]
fn resume_clears_drain_and_pause_state() {
    let dir = TempDir::new().expect("tempdir");
    cli(dir.path()).args(["pause", "--checkpoint", "planned"]).assert().success();
    cli(dir.path()).arg("drain").assert().success();

    cli(dir.path()).arg("resume").assert().success().stdout(predicates::str::contains("running"));

    let state = control_json(dir.path());
    assert_eq!(state["mode"], "running");
    assert!(state.get("pause_requested").is_none());
    assert!(state.get("pause_at_checkpoint").is_none());
}

#[test]
#[serial]
fn idempotent_control_patch_yields_identical_bytes() {
    let dir = TempDir::new().expect("tempdir");
    cli(dir.path()).arg("drain").assert().success();
    let first = std::fs::read(dir.path().join("control.json")).expect("read once");
    cli(dir.path()).arg("drain").assert().success();
    let second = std::fs::read(dir.path().join("control.json")).expect("read twice");
    assert_eq!(first, second, "applying the same control patch twice must be byte-identical (spec §8)");
}
