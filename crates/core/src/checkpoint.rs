// SPDX-License-Identifier: MIT

//! Pipeline checkpoints (spec §3, §4.E) and their per-run de-duper.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A named milestone in the worker pipeline, emitted in this exact order by
/// one successful run. Also the domain of `pause_at_checkpoint` in
/// [`crate::task::Task::paused_at_checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineCheckpoint {
    Planned,
    Routed,
    ImplementationStepComplete,
    PrReady,
    MergeStepComplete,
    SurveyComplete,
    Recorded,
}

crate::simple_display! {
    PipelineCheckpoint {
        Planned => "planned",
        Routed => "routed",
        ImplementationStepComplete => "implementation_step_complete",
        PrReady => "pr_ready",
        MergeStepComplete => "merge_step_complete",
        SurveyComplete => "survey_complete",
        Recorded => "recorded",
    }
}

impl PipelineCheckpoint {
    /// All checkpoints, in pipeline order.
    pub const ALL: [PipelineCheckpoint; 7] = [
        PipelineCheckpoint::Planned,
        PipelineCheckpoint::Routed,
        PipelineCheckpoint::ImplementationStepComplete,
        PipelineCheckpoint::PrReady,
        PipelineCheckpoint::MergeStepComplete,
        PipelineCheckpoint::SurveyComplete,
        PipelineCheckpoint::Recorded,
    ];
}

/// De-duplicates checkpoint events per `(taskPath, checkpoint)` within one
/// daemon run, so a late duplicate publish from a retried stage is dropped
/// (§4.E, §5 ordering invariant, §8 "at most one checkpoint event").
#[derive(Debug, Default)]
pub struct CheckpointDeduper {
    seen: HashSet<(String, PipelineCheckpoint)>,
}

impl CheckpointDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an emission attempt. Returns `true` the first time this
    /// `(task_path, checkpoint)` pair is seen, `false` on every repeat.
    pub fn should_emit(&mut self, task_path: &str, checkpoint: PipelineCheckpoint) -> bool {
        self.seen.insert((task_path.to_string(), checkpoint))
    }

    /// Drops all recorded state for a task, e.g. once it is finalized and its
    /// path may be reused by a later run.
    pub fn forget_task(&mut self, task_path: &str) {
        self.seen.retain(|(path, _)| path != task_path);
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
