//! Result aggregation: a pure projection of a task into an [`Outcome`].

use std::collections::BTreeMap;

use crate::models::outcome::{Outcome, StageStats, SubtaskResult};
use crate::models::task::{SubtaskKind, SubtaskStatus, Task};

fn stage_key(kind: SubtaskKind) -> &'static str {
    match kind {
        SubtaskKind::Validate => "validate",
        SubtaskKind::Generate => "generate",
        SubtaskKind::Merge => "merge",
    }
}

/// Fold a task's subtasks into an outcome. Works on in-flight tasks too, in
/// which case `elapsed_ms` runs to the last update.
pub fn aggregate(task: &Task) -> Outcome {
    let mut stage_stats: BTreeMap<String, StageStats> = BTreeMap::new();
    let mut artifacts_by_generator: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut artifact_locations = Vec::new();
    let mut per_subtask_results = Vec::with_capacity(task.subtasks.len());

    for s in &task.subtasks {
        let stats = stage_stats.entry(stage_key(s.kind).to_string()).or_default();
        stats.total += 1;
        stats.retries += s.retry_count;
        match s.status {
            SubtaskStatus::Succeeded => stats.succeeded += 1,
            SubtaskStatus::Failed => stats.failed += 1,
            SubtaskStatus::Skipped => stats.skipped += 1,
            SubtaskStatus::Pending | SubtaskStatus::Running => {}
        }

        if s.status == SubtaskStatus::Succeeded {
            artifact_locations.extend(s.artifact_refs.iter().cloned());
            if let Some(generator) = &s.generator {
                artifacts_by_generator
                    .entry(generator.clone())
                    .or_default()
                    .extend(s.artifact_refs.iter().cloned());
            }
        }

        per_subtask_results.push(SubtaskResult {
            subtask_id: s.id.clone(),
            kind: s.kind,
            generator: s.generator.clone(),
            status: s.status,
            retry_count: s.retry_count,
            last_error: s.last_error.clone(),
            artifact_refs: s.artifact_refs.clone(),
        });
    }

    let end = task.completed_at.unwrap_or(task.updated_at);
    Outcome {
        task_id: task.id.clone(),
        capability_name: task.capability_name.clone(),
        overall_status: task.status,
        failure_reason: task.failure_reason,
        per_subtask_results,
        stage_stats,
        artifacts_by_generator,
        artifact_locations,
        errors: task.errors.clone(),
        elapsed_ms: (end - task.created_at).num_milliseconds().max(0),
    }
}
