//! Pipeline orchestrator.
//!
//! Drives each task through VALIDATING → GENERATING → MERGING and into a
//! terminal status. Every admitted task gets its own driver (a tokio task)
//! that advances it one stage at a time until it is terminal.
//!
//! Locking:
//! - `driver` (per task) ensures one advancer per task
//! - `state` (per task) guards the task record; it is held only for short
//!   in-memory updates, never across a worker call
//! - `persist` (per task) orders checkpoints so an older snapshot can never
//!   overwrite a newer one
//!
//! There is no global lock: different tasks advance independently.

pub mod retry;


use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinSet;

use crate::error::DocflowError;
use crate::events::{EventBus, PipelineEvent};
use crate::models::capability::CapabilityDescriptor;
use crate::models::files::ResolvedFileSet;
use crate::models::routing::Parameters;
use crate::models::task::{FailureReason, SubtaskKind, SubtaskStatus, Task, TaskStatus};
use crate::store::TaskStore;
use crate::worker::{
    build_payload, WorkerClient, WorkerError, WorkerRequest, WorkerResponse, WorkerStage,
};

pub use retry::RetryPolicy;

const CANCELLED_IN_FLIGHT: &str = "cancelled while in flight";

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    /// Default timeout for one worker call.
    pub call_timeout: Duration,
    /// Whether MERGING may proceed when only some generations succeeded.
    pub allow_partial: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(300),
            allow_partial: true,
        }
    }
}

/// Everything needed to admit a task. Routing and resolution have already
/// happened by the time one of these exists.
#[derive(Debug, Clone)]
pub struct Submission {
    pub capability: CapabilityDescriptor,
    pub parameters: Parameters,
    pub resolved_files: ResolvedFileSet,
    pub payload_overrides: Option<serde_json::Map<String, serde_json::Value>>,
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub resumed: Vec<String>,
    pub interrupted: Vec<String>,
}

struct TaskHandle {
    state: RwLock<Task>,
    driver: Mutex<()>,
    persist: Mutex<()>,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

impl TaskHandle {
    fn new(task: Task) -> Self {
        Self {
            state: RwLock::new(task),
            driver: Mutex::new(()),
            persist: Mutex::new(()),
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How one generation subtask ended in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationEnd {
    Succeeded,
    Failed { transient: bool },
    Discarded,
}

struct OrchestratorInner {
    store: TaskStore,
    worker: Arc<dyn WorkerClient>,
    events: EventBus,
    config: PipelineConfig,
    live: RwLock<HashMap<String, Arc<TaskHandle>>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn new(
        store: TaskStore,
        worker: Arc<dyn WorkerClient>,
        events: EventBus,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                store,
                worker,
                events,
                config,
                live: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> PipelineConfig {
        self.inner.config
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    // ─── Admission ─────────────────────────────────────────────────────────

    /// Admit a task in PENDING and start driving it. Returns immediately.
    pub async fn submit(&self, submission: Submission) -> Result<Task, DocflowError> {
        let Submission {
            capability,
            parameters,
            resolved_files,
            payload_overrides,
            session_id,
        } = submission;

        let payload = build_payload(
            &capability,
            &parameters,
            &resolved_files,
            payload_overrides.as_ref(),
        )?;
        let task = Task::new(
            uuid::Uuid::new_v4().to_string(),
            capability.name.clone(),
            capability.endpoint_uri.clone(),
            capability.timeout_secs,
            session_id,
            parameters,
            resolved_files,
            payload,
            &capability.generator_kinds(),
        );
        self.inner.store.save(&task).await?;

        tracing::info!(
            task_id = %task.id,
            capability = %task.capability_name,
            subtasks = task.subtasks.len(),
            "[Pipeline] Task admitted"
        );
        self.inner.events.publish(PipelineEvent::TaskSubmitted {
            task_id: task.id.clone(),
            capability_name: task.capability_name.clone(),
        });

        let snapshot = task.clone();
        self.start(task).await;
        Ok(snapshot)
    }

    async fn start(&self, task: Task) {
        let id = task.id.clone();
        let handle = Arc::new(TaskHandle::new(task));
        self.inner
            .live
            .write()
            .await
            .insert(id.clone(), handle.clone());

        let this = self.clone();
        tokio::spawn(async move {
            this.drive(&handle).await;
            this.inner.live.write().await.remove(&id);
        });
    }

    async fn drive(&self, handle: &Arc<TaskHandle>) {
        let _driver = handle.driver.lock().await;
        loop {
            match self.advance(handle).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    let id = handle.state.read().await.id.clone();
                    tracing::error!(task_id = %id, "[Pipeline] Driver error: {}", e);
                    let message = e.to_string();
                    let failed = self
                        .update(handle, |task| task.fail(FailureReason::Internal, message))
                        .await;
                    if let Err(e) = failed {
                        tracing::error!(task_id = %id, "[Pipeline] Could not record failure: {}", e);
                    }
                    break;
                }
            }
        }
    }

    /// Run whatever the task's current stage needs. Returns `false` once the
    /// task is terminal.
    async fn advance(&self, handle: &Arc<TaskHandle>) -> Result<bool, DocflowError> {
        let status = handle.state.read().await.status;
        match status {
            TaskStatus::Pending => {
                self.update(handle, |task| task.transition(TaskStatus::Validating))
                    .await?;
            }
            TaskStatus::Validating => self.run_validation(handle).await?,
            TaskStatus::Generating => self.run_generation(handle).await?,
            TaskStatus::Merging => self.run_merge(handle).await?,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Partial => return Ok(false),
        }
        Ok(!handle.state.read().await.status.is_terminal())
    }

    // ─── Stages ────────────────────────────────────────────────────────────

    async fn run_validation(&self, handle: &Arc<TaskHandle>) -> Result<(), DocflowError> {
        let prepared = self
            .update(handle, |task| {
                let Some(id) = task.first_of(SubtaskKind::Validate).map(|s| s.id.clone()) else {
                    return Err(DocflowError::Internal("task has no VALIDATE subtask".into()));
                };
                if task.subtask(&id).map(|s| s.status) == Some(SubtaskStatus::Succeeded) {
                    task.transition(TaskStatus::Generating)?;
                    return Ok(None);
                }
                if let Some(s) = task.subtask_mut(&id) {
                    s.start();
                }
                task.attempt_count += 1;
                Ok(Some((id, self.request(task, WorkerStage::Validate, None, vec![]))))
            })
            .await?;
        let Some(Some((subtask_id, (endpoint, request, timeout)))) = prepared else {
            return Ok(());
        };

        let result = self.call(&endpoint, &request, timeout).await;

        let events = self.inner.events.clone();
        self.update(handle, move |task| {
            match result {
                Ok(resp) if resp.is_success() => {
                    if let Some(s) = task.subtask_mut(&subtask_id) {
                        s.succeed(resp.artifact_refs);
                    }
                    publish_subtask(&events, task, &subtask_id);
                    task.transition(TaskStatus::Generating)
                }
                Ok(resp) => {
                    let message = resp
                        .message
                        .unwrap_or_else(|| "validation rejected the input".into());
                    task.fail_subtask(&subtask_id, message);
                    publish_subtask(&events, task, &subtask_id);
                    task.fail(FailureReason::ValidationFailed, "validation failed")
                }
                Err(e) => {
                    let reason = if e.is_transient() {
                        FailureReason::WorkerUnavailable
                    } else {
                        FailureReason::ValidationFailed
                    };
                    task.fail_subtask(&subtask_id, e.to_string());
                    publish_subtask(&events, task, &subtask_id);
                    task.fail(reason, "validation failed")
                }
            }
        })
        .await?;
        Ok(())
    }

    async fn run_generation(&self, handle: &Arc<TaskHandle>) -> Result<(), DocflowError> {
        let jobs = self
            .update(handle, |task| {
                let mut jobs = Vec::new();
                for s in task.subtasks.iter_mut() {
                    if s.kind == SubtaskKind::Generate && s.status == SubtaskStatus::Pending {
                        s.start();
                        jobs.push((s.id.clone(), s.generator.clone(), s.retry_count));
                    }
                }
                Ok(jobs)
            })
            .await?;
        let Some(jobs) = jobs else { return Ok(()) };

        let mut set = JoinSet::new();
        for (subtask_id, generator, retries_used) in jobs {
            let this = self.clone();
            let handle = handle.clone();
            set.spawn(async move {
                let end = this
                    .generate_one(&handle, &subtask_id, generator, retries_used)
                    .await;
                (subtask_id, end)
            });
        }

        let mut transient_failures = 0usize;
        let mut permanent_failures = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(GenerationEnd::Failed { transient: true }))) => transient_failures += 1,
                Ok((_, Ok(GenerationEnd::Failed { transient: false }))) => permanent_failures += 1,
                Ok((_, Ok(_))) => {}
                Ok((id, Err(e))) => {
                    tracing::error!(subtask_id = %id, "[Pipeline] Generation bookkeeping failed: {}", e);
                    permanent_failures += 1;
                }
                Err(e) => {
                    tracing::error!("[Pipeline] Generation worker task aborted: {}", e);
                    permanent_failures += 1;
                }
            }
        }

        let allow_partial = self.inner.config.allow_partial;
        self.update(handle, move |task| {
            // Anything still RUNNING lost its runner.
            let orphaned: Vec<String> = task
                .subtasks_of(SubtaskKind::Generate)
                .filter(|s| s.status == SubtaskStatus::Running)
                .map(|s| s.id.clone())
                .collect();
            for id in orphaned {
                task.fail_subtask(&id, "generation runner aborted");
            }

            let total = task.subtasks_of(SubtaskKind::Generate).count();
            let succeeded = task
                .subtasks_of(SubtaskKind::Generate)
                .filter(|s| s.status == SubtaskStatus::Succeeded)
                .count();

            if succeeded == total || (allow_partial && succeeded > 0) {
                if succeeded < total {
                    tracing::warn!(
                        task_id = %task.id,
                        succeeded,
                        total,
                        "[Pipeline] Merging partial generation results"
                    );
                }
                task.transition(TaskStatus::Merging)
            } else {
                let reason = if transient_failures > 0 && permanent_failures == 0 {
                    FailureReason::WorkerUnavailable
                } else {
                    FailureReason::GenerationFailed
                };
                task.fail(reason, "generation failed")
            }
        })
        .await?;
        Ok(())
    }

    /// One generation subtask with its own retry loop.
    async fn generate_one(
        &self,
        handle: &Arc<TaskHandle>,
        subtask_id: &str,
        generator: Option<String>,
        mut retries_used: u32,
    ) -> Result<GenerationEnd, DocflowError> {
        let policy = self.inner.config.retry;
        loop {
            let cancel_wake = handle.cancel_notify.notified();
            if handle.is_cancelled() {
                return Ok(GenerationEnd::Discarded);
            }

            let generator_tag = generator.clone();
            let prepared = self
                .mutate(handle, |task| {
                    task.attempt_count += 1;
                    self.request(task, WorkerStage::Generate, generator_tag, vec![])
                })
                .await;
            let Some((endpoint, request, timeout)) = prepared else {
                return Ok(GenerationEnd::Discarded);
            };

            let result = self.call(&endpoint, &request, timeout).await;

            let error = match result {
                Ok(resp) if resp.is_success() => {
                    let id = subtask_id.to_string();
                    let events = self.inner.events.clone();
                    let recorded = self
                        .update(handle, move |task| {
                            if let Some(s) = task.subtask_mut(&id) {
                                s.succeed(resp.artifact_refs);
                            }
                            publish_subtask(&events, task, &id);
                            Ok(())
                        })
                        .await?;
                    return Ok(match recorded {
                        Some(()) => GenerationEnd::Succeeded,
                        None => GenerationEnd::Discarded,
                    });
                }
                Ok(resp) => {
                    // Worker-reported failure is not transient.
                    let message = resp.message.unwrap_or_else(|| "generation failed".into());
                    return self.record_generation_failure(handle, subtask_id, message, false).await;
                }
                Err(e) => e,
            };

            if !error.is_transient() || !policy.allows_retry(retries_used) {
                let transient = error.is_transient();
                return self
                    .record_generation_failure(handle, subtask_id, error.to_string(), transient)
                    .await;
            }

            let delay = policy.backoff(retries_used);
            retries_used += 1;
            let id = subtask_id.to_string();
            let message = error.to_string();
            let noted = self
                .mutate(handle, |task| {
                    if let Some(s) = task.subtask_mut(&id) {
                        s.retry_count = retries_used;
                        s.last_error = Some(message.clone());
                    }
                    task.id.clone()
                })
                .await;
            let Some(task_id) = noted else {
                return Ok(GenerationEnd::Discarded);
            };

            tracing::warn!(
                task_id = %task_id,
                subtask_id = %subtask_id,
                attempt = retries_used,
                delay_ms = delay.as_millis() as u64,
                "[Pipeline] Retrying generation after transient failure: {}",
                message
            );
            self.inner.events.publish(PipelineEvent::SubtaskRetrying {
                task_id,
                subtask_id: subtask_id.to_string(),
                attempt: retries_used,
                delay_ms: delay.as_millis() as u64,
                error: message,
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_wake => return Ok(GenerationEnd::Discarded),
            }
        }
    }

    async fn record_generation_failure(
        &self,
        handle: &Arc<TaskHandle>,
        subtask_id: &str,
        message: String,
        transient: bool,
    ) -> Result<GenerationEnd, DocflowError> {
        let id = subtask_id.to_string();
        let events = self.inner.events.clone();
        let recorded = self
            .update(handle, move |task| {
                task.fail_subtask(&id, message);
                publish_subtask(&events, task, &id);
                Ok(())
            })
            .await?;
        Ok(match recorded {
            Some(()) => GenerationEnd::Failed { transient },
            None => GenerationEnd::Discarded,
        })
    }

    async fn run_merge(&self, handle: &Arc<TaskHandle>) -> Result<(), DocflowError> {
        let prepared = self
            .update(handle, |task| {
                let Some(id) = task.first_of(SubtaskKind::Merge).map(|s| s.id.clone()) else {
                    return Err(DocflowError::Internal("task has no MERGE subtask".into()));
                };
                let inputs = task.generated_artifacts();
                if let Some(s) = task.subtask_mut(&id) {
                    s.start();
                }
                task.attempt_count += 1;
                Ok((id, self.request(task, WorkerStage::Merge, None, inputs)))
            })
            .await?;
        let Some((subtask_id, (endpoint, request, timeout))) = prepared else {
            return Ok(());
        };

        // Merge is never retried.
        let result = self.call(&endpoint, &request, timeout).await;

        let events = self.inner.events.clone();
        self.update(handle, move |task| match result {
            Ok(resp) if resp.is_success() => {
                if let Some(s) = task.subtask_mut(&subtask_id) {
                    s.succeed(resp.artifact_refs);
                }
                publish_subtask(&events, task, &subtask_id);
                let terminal = task.derive_terminal_status();
                if terminal == TaskStatus::Failed {
                    task.fail(FailureReason::GenerationFailed, "no generation succeeded")
                } else {
                    task.transition(terminal)
                }
            }
            Ok(resp) => {
                let message = resp.message.unwrap_or_else(|| "merge failed".into());
                task.fail_subtask(&subtask_id, message);
                publish_subtask(&events, task, &subtask_id);
                task.fail(FailureReason::StructuralFailure, "merge failed")
            }
            Err(e) => {
                let reason = if e.is_transient() {
                    FailureReason::WorkerUnavailable
                } else {
                    FailureReason::StructuralFailure
                };
                task.fail_subtask(&subtask_id, e.to_string());
                publish_subtask(&events, task, &subtask_id);
                task.fail(reason, "merge failed")
            }
        })
        .await?;
        Ok(())
    }

    // ─── Caller surface ────────────────────────────────────────────────────

    /// Cancel a non-terminal task. PENDING and RUNNING subtasks become
    /// SKIPPED; results of in-flight calls are discarded when they arrive.
    pub async fn cancel(&self, id: &str) -> Result<Task, DocflowError> {
        let handle = self.inner.live.read().await.get(id).cloned();
        let Some(handle) = handle else {
            return match self.inner.store.get(id).await? {
                Some(task) if task.status.is_terminal() => Err(DocflowError::Conflict(format!(
                    "Task {} is already {}",
                    id,
                    task.status.as_str()
                ))),
                Some(mut task) => {
                    // Persisted but not driven by this process.
                    task.fail(FailureReason::Cancelled, "cancelled by caller")?;
                    self.inner.store.save(&task).await?;
                    tracing::warn!(task_id = %id, "[Pipeline] Stored task cancelled");
                    self.inner.events.publish(PipelineEvent::TaskFinished {
                        task_id: task.id.clone(),
                        status: task.status,
                        failure_reason: task.failure_reason,
                    });
                    Ok(task)
                }
                None => Err(DocflowError::NotFound(format!("Task {} not found", id))),
            };
        };

        let cancelled = self
            .update(&handle, |task| {
                for s in task.subtasks.iter_mut() {
                    if s.status == SubtaskStatus::Running {
                        s.skip(CANCELLED_IN_FLIGHT);
                    }
                }
                task.fail(FailureReason::Cancelled, "cancelled by caller")
            })
            .await?;
        if cancelled.is_none() {
            let status = handle.state.read().await.status;
            return Err(DocflowError::Conflict(format!(
                "Task {} is already {}",
                id,
                status.as_str()
            )));
        }

        handle.cancelled.store(true, Ordering::SeqCst);
        handle.cancel_notify.notify_waiters();
        tracing::warn!(task_id = %id, "[Pipeline] Task cancelled");
        let snapshot = handle.state.read().await.clone();
        Ok(snapshot)
    }

    /// Live snapshot for in-flight tasks, persisted record otherwise.
    pub async fn get(&self, id: &str) -> Result<Task, DocflowError> {
        let handle = self.inner.live.read().await.get(id).cloned();
        if let Some(handle) = handle {
            let snapshot = handle.state.read().await.clone();
            return Ok(snapshot);
        }
        self.inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| DocflowError::NotFound(format!("Task {} not found", id)))
    }

    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>, DocflowError> {
        self.inner.store.list(status, limit).await
    }

    /// Poll until the task's driver has finished (so its terminal state is
    /// persisted) or `max_wait` elapses; returns the best-known snapshot
    /// either way. A task no driver owns is returned as persisted.
    pub async fn wait(&self, id: &str, max_wait: Duration) -> Result<Task, DocflowError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let driven = self.inner.live.read().await.contains_key(id);
            let task = self.get(id).await?;
            if !driven || tokio::time::Instant::now() >= deadline {
                return Ok(task);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Resume tasks left in flight by a previous process.
    ///
    /// PENDING, VALIDATING and GENERATING resume from their stage (RUNNING
    /// subtasks go back to PENDING; finished generations keep their
    /// artifacts). A MERGING task whose merge was already RUNNING cannot
    /// be resumed safely and is failed with `Interrupted`.
    pub async fn recover(&self) -> Result<RecoveryReport, DocflowError> {
        let mut report = RecoveryReport::default();
        for mut task in self.inner.store.list_unfinished().await? {
            if self.inner.live.read().await.contains_key(&task.id) {
                continue;
            }

            let merge_in_flight = task.status == TaskStatus::Merging
                && task
                    .first_of(SubtaskKind::Merge)
                    .map(|s| s.status == SubtaskStatus::Running)
                    .unwrap_or(false);
            if merge_in_flight {
                if let Some(id) = task.first_of(SubtaskKind::Merge).map(|s| s.id.clone()) {
                    task.fail_subtask(&id, "interrupted by restart during merge");
                }
                task.fail(FailureReason::Interrupted, "interrupted by restart")?;
                self.inner.store.save(&task).await?;
                tracing::warn!(task_id = %task.id, "[Pipeline] Task interrupted during merge");
                self.inner.events.publish(PipelineEvent::TaskFinished {
                    task_id: task.id.clone(),
                    status: task.status,
                    failure_reason: task.failure_reason,
                });
                report.interrupted.push(task.id);
                continue;
            }

            for s in task.subtasks.iter_mut() {
                if s.status == SubtaskStatus::Running {
                    s.status = SubtaskStatus::Pending;
                    s.started_at = None;
                }
            }
            task.updated_at = crate::models::now();
            self.inner.store.save(&task).await?;
            tracing::info!(
                task_id = %task.id,
                status = task.status.as_str(),
                "[Pipeline] Resuming task"
            );
            report.resumed.push(task.id.clone());
            self.start(task).await;
        }
        Ok(report)
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    fn request(
        &self,
        task: &Task,
        stage: WorkerStage,
        generator: Option<String>,
        inputs: Vec<String>,
    ) -> (String, WorkerRequest, Duration) {
        let timeout = task
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.inner.config.call_timeout);
        let request = WorkerRequest {
            task_id: task.id.clone(),
            stage,
            generator,
            payload: task.payload.clone(),
            inputs,
        };
        (task.endpoint_uri.clone(), request, timeout)
    }

    async fn call(
        &self,
        endpoint: &str,
        request: &WorkerRequest,
        timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError> {
        match tokio::time::timeout(timeout, self.inner.worker.invoke(endpoint, request, timeout))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout(timeout)),
        }
    }

    /// Apply `f` to a non-terminal task without checkpointing.
    /// Returns `None` if the task is already terminal.
    async fn mutate<F, R>(&self, handle: &TaskHandle, f: F) -> Option<R>
    where
        F: FnOnce(&mut Task) -> R,
    {
        let mut task = handle.state.write().await;
        if task.status.is_terminal() {
            return None;
        }
        let r = f(&mut *task);
        task.updated_at = crate::models::now();
        Some(r)
    }

    /// Apply `f` to a non-terminal task, checkpoint, and publish any status
    /// change. Returns `Ok(None)` if the task was already terminal, in which
    /// case nothing is recorded.
    async fn update<F, R>(&self, handle: &TaskHandle, f: F) -> Result<Option<R>, DocflowError>
    where
        F: FnOnce(&mut Task) -> Result<R, DocflowError>,
    {
        let (result, task_id, from, to, reason) = {
            let mut task = handle.state.write().await;
            if task.status.is_terminal() {
                return Ok(None);
            }
            let from = task.status;
            let result = f(&mut *task)?;
            task.updated_at = crate::models::now();
            (result, task.id.clone(), from, task.status, task.failure_reason)
        };

        self.checkpoint(handle).await?;

        if from != to {
            tracing::info!(
                task_id = %task_id,
                from = from.as_str(),
                to = to.as_str(),
                "[Pipeline] Stage transition"
            );
            self.inner.events.publish(PipelineEvent::TaskStatusChanged {
                task_id: task_id.clone(),
                from,
                to,
            });
            if to.is_terminal() {
                tracing::info!(
                    task_id = %task_id,
                    status = to.as_str(),
                    reason = reason.map(|r| r.as_str()).unwrap_or("-"),
                    "[Pipeline] Task finished"
                );
                self.inner.events.publish(PipelineEvent::TaskFinished {
                    task_id,
                    status: to,
                    failure_reason: reason,
                });
            }
        }
        Ok(Some(result))
    }

    async fn checkpoint(&self, handle: &TaskHandle) -> Result<(), DocflowError> {
        let _order = handle.persist.lock().await;
        let snapshot = handle.state.read().await.clone();
        self.inner.store.save(&snapshot).await.map_err(|e| {
            tracing::error!(task_id = %snapshot.id, "[Pipeline] Checkpoint failed: {}", e);
            e
        })
    }
}

fn publish_subtask(events: &EventBus, task: &Task, subtask_id: &str) {
    if let Some(s) = task.subtask(subtask_id) {
        events.publish(PipelineEvent::SubtaskFinished {
            task_id: task.id.clone(),
            subtask_id: s.id.clone(),
            kind: s.kind,
            generator: s.generator.clone(),
            status: s.status,
        });
    }
}
