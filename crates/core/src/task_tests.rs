// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn new_task_starts_queued_with_no_session() {
    let t = Task::new("owner/repo#1", "owner/repo", "owner/repo#1");
    assert_eq!(t.status, TaskStatus::Queued);
    assert!(t.session_id.is_none());
    assert!(t.satisfies_session_invariant());
    assert!(t.satisfies_worktree_invariant());
    assert!(t.satisfies_resume_at_invariant());
}

#[test]
fn allowed_transitions_match_section_4d_table() {
    use TaskStatus::*;
    assert!(allowed_transition(Queued, Starting));
    assert!(allowed_transition(Starting, InProgress));
    assert!(allowed_transition(InProgress, Done));
    assert!(allowed_transition(InProgress, Throttled));
    assert!(allowed_transition(InProgress, Blocked));
    assert!(allowed_transition(InProgress, Escalated));
    assert!(allowed_transition(InProgress, WaitingOnPr));
    assert!(allowed_transition(Throttled, Queued));
    assert!(allowed_transition(Blocked, Queued));
    assert!(allowed_transition(Escalated, Queued));
}

#[test]
fn disallowed_transitions_are_rejected() {
    use TaskStatus::*;
    assert!(!allowed_transition(Queued, InProgress));
    assert!(!allowed_transition(Done, Queued));
    assert!(!allowed_transition(WaitingOnPr, Queued));
    assert!(!allowed_transition(Throttled, InProgress));
}

#[test]
fn in_progress_without_session_violates_invariant() {
    let t = TaskBuilder::default().status(TaskStatus::InProgress).build();
    assert!(!t.satisfies_session_invariant());
}

#[test]
fn in_progress_with_session_satisfies_invariant() {
    let t = TaskBuilder::default()
        .status(TaskStatus::InProgress)
        .session_id("sess-1")
        .worktree_path("/tmp/w")
        .build();
    assert!(t.satisfies_session_invariant());
    assert!(t.satisfies_worktree_invariant());
}

#[test]
fn throttled_without_resume_at_violates_invariant() {
    let t = TaskBuilder::default().status(TaskStatus::Throttled).build();
    assert!(!t.satisfies_resume_at_invariant());
}

#[test]
fn throttled_with_resume_at_satisfies_invariant() {
    let t = TaskBuilder::default()
        .status(TaskStatus::Throttled)
        .resume_at(1_000u64)
        .build();
    assert!(t.satisfies_resume_at_invariant());
}

#[test]
fn clear_exit_fields_wipes_session_and_blocked_state() {
    let mut t = TaskBuilder::default()
        .status(TaskStatus::InProgress)
        .session_id("sess-1")
        .worktree_path("/tmp/w")
        .worker_id("worker-1")
        .repo_slot("slot-0")
        .watchdog_retries(2)
        .blocked_source(BlockedSource::Stall)
        .blocked_at(5u64)
        .blocked_detail("stalled")
        .build();

    t.status = TaskStatus::Done;
    t.clear_exit_fields();

    assert!(t.session_id.is_none());
    assert!(t.worktree_path.is_none());
    assert!(t.worker_id.is_none());
    assert!(t.repo_slot.is_none());
    assert_eq!(t.watchdog_retries, 0);
    assert!(t.blocked_source.is_none());
    assert!(t.blocked_at.is_none());
    assert!(t.blocked_detail.is_none());
}

#[test]
fn status_display_matches_wire_format() {
    assert_eq!(TaskStatus::InProgress.to_string(), "in-progress");
    assert_eq!(TaskStatus::WaitingOnPr.to_string(), "waiting-on-pr");
}

#[test]
fn status_serializes_kebab_case() {
    let json = serde_json::to_string(&TaskStatus::WaitingOnPr).unwrap();
    assert_eq!(json, "\"waiting-on-pr\"");
}

#[test]
fn priority_orders_high_above_normal_above_low() {
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);
}

#[test]
fn task_round_trips_through_json() {
    let t = TaskBuilder::default()
        .status(TaskStatus::Throttled)
        .resume_at(42u64)
        .build();
    let json = serde_json::to_string(&t).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(back, t);
}
