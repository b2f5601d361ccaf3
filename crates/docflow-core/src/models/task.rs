use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DocflowError;
use crate::models::files::ResolvedFileSet;
use crate::models::routing::Parameters;

/// Pipeline status of a task. Transitions are forward-only:
/// PENDING → VALIDATING → GENERATING → MERGING → {COMPLETED | FAILED | PARTIAL},
/// with FAILED reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Validating,
    Generating,
    Merging,
    Completed,
    Failed,
    Partial,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Validating => "VALIDATING",
            Self::Generating => "GENERATING",
            Self::Merging => "MERGING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Partial => "PARTIAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "VALIDATING" => Some(Self::Validating),
            "GENERATING" => Some(Self::Generating),
            "MERGING" => Some(Self::Merging),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "PARTIAL" => Some(Self::Partial),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Partial)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Validating)
                | (Pending, Failed)
                | (Validating, Generating)
                | (Validating, Failed)
                | (Generating, Merging)
                | (Generating, Failed)
                | (Merging, Completed)
                | (Merging, Partial)
                | (Merging, Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubtaskKind {
    Validate,
    Generate,
    Merge,
}

impl SubtaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "VALIDATE",
            Self::Generate => "GENERATE",
            Self::Merge => "MERGE",
        }
    }

    /// Short id prefix for subtasks of this kind.
    fn prefix(&self) -> &'static str {
        match self {
            Self::Validate => "val",
            Self::Generate => "gen",
            Self::Merge => "mrg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubtaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Why a task ended FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    ValidationFailed,
    WorkerUnavailable,
    GenerationFailed,
    StructuralFailure,
    Cancelled,
    Interrupted,
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::WorkerUnavailable => "WORKER_UNAVAILABLE",
            Self::GenerationFailed => "GENERATION_FAILED",
            Self::StructuralFailure => "STRUCTURAL_FAILURE",
            Self::Cancelled => "CANCELLED",
            Self::Interrupted => "INTERRUPTED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "VALIDATION_FAILED" => Some(Self::ValidationFailed),
            "WORKER_UNAVAILABLE" => Some(Self::WorkerUnavailable),
            "GENERATION_FAILED" => Some(Self::GenerationFailed),
            "STRUCTURAL_FAILURE" => Some(Self::StructuralFailure),
            "CANCELLED" => Some(Self::Cancelled),
            "INTERRUPTED" => Some(Self::Interrupted),
            "INTERNAL" => Some(Self::Internal),
            _ => None,
        }
    }
}

/// One atomic unit of execution within a pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub kind: SubtaskKind,
    /// Generation kind tag; only set on GENERATE subtasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    pub status: SubtaskStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub artifact_refs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Subtask {
    pub fn new(kind: SubtaskKind, generator: Option<String>) -> Self {
        let short = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}_{}", kind.prefix(), &short[..8]),
            kind,
            generator,
            status: SubtaskStatus::Pending,
            retry_count: 0,
            last_error: None,
            artifact_refs: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = SubtaskStatus::Running;
        self.started_at = Some(crate::models::now());
    }

    pub fn succeed(&mut self, artifact_refs: Vec<String>) {
        self.status = SubtaskStatus::Succeeded;
        self.artifact_refs = artifact_refs;
        self.last_error = None;
        self.finished_at = Some(crate::models::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = SubtaskStatus::Failed;
        self.last_error = Some(error.into());
        self.finished_at = Some(crate::models::now());
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = SubtaskStatus::Skipped;
        self.last_error = Some(reason.into());
        self.finished_at = Some(crate::models::now());
    }
}

/// An error recorded against a task, usually tied to a failed subtask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask_id: Option<String>,
    pub message: String,
}

/// A unit of pipeline work, owned by the orchestrator for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub capability_name: String,
    /// Endpoint snapshot taken at admission.
    pub endpoint_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub resolved_files: ResolvedFileSet,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub subtasks: Vec<Subtask>,
    /// Total worker invocations made for this task, retries included.
    pub attempt_count: u32,
    #[serde(default)]
    pub errors: Vec<TaskError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a PENDING task with one VALIDATE, one GENERATE per generator
    /// kind, and one MERGE subtask.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        capability_name: String,
        endpoint_uri: String,
        timeout_secs: Option<u64>,
        session_id: Option<String>,
        parameters: Parameters,
        resolved_files: ResolvedFileSet,
        payload: serde_json::Value,
        generators: &[String],
    ) -> Self {
        let now = crate::models::now();
        let mut subtasks = Vec::with_capacity(generators.len() + 2);
        subtasks.push(Subtask::new(SubtaskKind::Validate, None));
        for kind in generators {
            subtasks.push(Subtask::new(SubtaskKind::Generate, Some(kind.clone())));
        }
        subtasks.push(Subtask::new(SubtaskKind::Merge, None));

        Self {
            id,
            capability_name,
            endpoint_uri,
            timeout_secs,
            session_id,
            parameters,
            resolved_files,
            payload,
            status: TaskStatus::Pending,
            failure_reason: None,
            subtasks,
            attempt_count: 0,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Move to `next`, enforcing the forward-only state machine.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), DocflowError> {
        if !self.status.can_transition_to(next) {
            return Err(DocflowError::Conflict(format!(
                "Task {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = crate::models::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Terminate as FAILED, skipping every subtask that never finished.
    pub fn fail(&mut self, reason: FailureReason, message: impl Into<String>) -> Result<(), DocflowError> {
        let message = message.into();
        self.transition(TaskStatus::Failed)?;
        self.failure_reason = Some(reason);
        for subtask in self.subtasks.iter_mut() {
            if !subtask.status.is_finished() {
                subtask.skip(message.clone());
            }
        }
        // Failures without a failed subtask (cancel, interrupt) still carry one error.
        if !self
            .subtasks
            .iter()
            .any(|s| s.status == SubtaskStatus::Failed)
            || reason == FailureReason::Cancelled
        {
            self.errors.push(TaskError {
                subtask_id: None,
                message,
            });
        }
        Ok(())
    }

    pub fn subtask(&self, id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn subtask_mut(&mut self, id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }

    pub fn subtasks_of(&self, kind: SubtaskKind) -> impl Iterator<Item = &Subtask> {
        self.subtasks.iter().filter(move |s| s.kind == kind)
    }

    pub fn first_of(&self, kind: SubtaskKind) -> Option<&Subtask> {
        self.subtasks_of(kind).next()
    }

    /// Record a subtask failure together with its task-level error entry.
    pub fn fail_subtask(&mut self, subtask_id: &str, error: impl Into<String>) {
        let error = error.into();
        if let Some(subtask) = self.subtask_mut(subtask_id) {
            subtask.fail(error.clone());
        }
        self.errors.push(TaskError {
            subtask_id: Some(subtask_id.to_string()),
            message: error,
        });
        self.updated_at = crate::models::now();
    }

    /// Artifact refs of succeeded GENERATE subtasks, in declaration order.
    pub fn generated_artifacts(&self) -> Vec<String> {
        self.subtasks_of(SubtaskKind::Generate)
            .filter(|s| s.status == SubtaskStatus::Succeeded)
            .flat_map(|s| s.artifact_refs.iter().cloned())
            .collect()
    }

    /// COMPLETED iff every subtask succeeded; PARTIAL iff the merge
    /// succeeded but at least one generation failed; FAILED otherwise.
    pub fn derive_terminal_status(&self) -> TaskStatus {
        if self
            .subtasks
            .iter()
            .all(|s| s.status == SubtaskStatus::Succeeded)
        {
            return TaskStatus::Completed;
        }
        let merged = self
            .first_of(SubtaskKind::Merge)
            .map(|s| s.status == SubtaskStatus::Succeeded)
            .unwrap_or(false);
        let generation_failed = self
            .subtasks_of(SubtaskKind::Generate)
            .any(|s| s.status == SubtaskStatus::Failed);
        if merged && generation_failed {
            TaskStatus::Partial
        } else {
            TaskStatus::Failed
        }
    }
}
