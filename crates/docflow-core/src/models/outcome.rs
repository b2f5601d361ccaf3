use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::task::{FailureReason, SubtaskKind, SubtaskStatus, TaskError, TaskStatus};

/// Result of one subtask as reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskResult {
    pub subtask_id: String,
    pub kind: SubtaskKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    pub status: SubtaskStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub artifact_refs: Vec<String>,
}

/// Per-stage counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStats {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
    pub retries: u32,
}

/// Terminal (or best-known) view of a task, produced by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub task_id: String,
    pub capability_name: String,
    pub overall_status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub per_subtask_results: Vec<SubtaskResult>,
    /// Keyed by stage name: `validate`, `generate`, `merge`.
    pub stage_stats: BTreeMap<String, StageStats>,
    pub artifacts_by_generator: BTreeMap<String, Vec<String>>,
    pub artifact_locations: Vec<String>,
    pub errors: Vec<TaskError>,
    pub elapsed_ms: i64,
}
