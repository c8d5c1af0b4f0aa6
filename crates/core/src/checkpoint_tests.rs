// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn checkpoints_are_ordered_pipeline_order() {
    assert!(PipelineCheckpoint::Planned < PipelineCheckpoint::Routed);
    assert!(PipelineCheckpoint::Routed < PipelineCheckpoint::ImplementationStepComplete);
    assert!(PipelineCheckpoint::PrReady < PipelineCheckpoint::MergeStepComplete);
    assert!(PipelineCheckpoint::SurveyComplete < PipelineCheckpoint::Recorded);
}

#[test]
fn display_matches_wire_names() {
    assert_eq!(
        PipelineCheckpoint::ImplementationStepComplete.to_string(),
        "implementation_step_complete"
    );
    assert_eq!(PipelineCheckpoint::PrReady.to_string(), "pr_ready");
}

#[test]
fn serde_uses_snake_case() {
    let json = serde_json::to_string(&PipelineCheckpoint::MergeStepComplete).unwrap();
    assert_eq!(json, "\"merge_step_complete\"");
}

#[test]
fn deduper_emits_once_per_task_and_checkpoint() {
    let mut d = CheckpointDeduper::new();
    assert!(d.should_emit("repo/1", PipelineCheckpoint::Planned));
    assert!(!d.should_emit("repo/1", PipelineCheckpoint::Planned));
    assert!(d.should_emit("repo/1", PipelineCheckpoint::Routed));
}

#[test]
fn deduper_distinguishes_tasks() {
    let mut d = CheckpointDeduper::new();
    assert!(d.should_emit("repo/1", PipelineCheckpoint::Planned));
    assert!(d.should_emit("repo/2", PipelineCheckpoint::Planned));
}

#[test]
fn forget_task_clears_its_emitted_set() {
    let mut d = CheckpointDeduper::new();
    d.should_emit("repo/1", PipelineCheckpoint::Planned);
    d.forget_task("repo/1");
    assert!(d.should_emit("repo/1", PipelineCheckpoint::Planned));
}

#[test]
fn forget_task_leaves_other_tasks_intact() {
    let mut d = CheckpointDeduper::new();
    d.should_emit("repo/1", PipelineCheckpoint::Planned);
    d.should_emit("repo/2", PipelineCheckpoint::Planned);
    d.forget_task("repo/1");
    assert!(!d.should_emit("repo/2", PipelineCheckpoint::Planned));
}

#[test]
fn all_lists_every_checkpoint_once_in_order() {
    let all = PipelineCheckpoint::ALL;
    assert_eq!(all.len(), 7);
    for pair in all.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}
