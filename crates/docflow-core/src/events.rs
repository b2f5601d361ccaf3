//! In-process pipeline event bus.
//!
//! Events are fire-and-forget: publishing never blocks and a bus without
//! subscribers drops them. Slow subscribers may observe `Lagged`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::routing::Parameters;
use crate::models::task::{FailureReason, SubtaskKind, SubtaskStatus, TaskStatus};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PipelineEvent {
    RouteDecided {
        capability_name: String,
        confidence: f64,
        parameters: Parameters,
    },
    TaskSubmitted {
        task_id: String,
        capability_name: String,
    },
    TaskStatusChanged {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    SubtaskRetrying {
        task_id: String,
        subtask_id: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    SubtaskFinished {
        task_id: String,
        subtask_id: String,
        kind: SubtaskKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        generator: Option<String>,
        status: SubtaskStatus,
    },
    TaskFinished {
        task_id: String,
        status: TaskStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure_reason: Option<FailureReason>,
    },
}

impl PipelineEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            PipelineEvent::RouteDecided { .. } => None,
            PipelineEvent::TaskSubmitted { task_id, .. }
            | PipelineEvent::TaskStatusChanged { task_id, .. }
            | PipelineEvent::SubtaskRetrying { task_id, .. }
            | PipelineEvent::SubtaskFinished { task_id, .. }
            | PipelineEvent::TaskFinished { task_id, .. } => Some(task_id),
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::RouteDecided { .. } => "routeDecided",
            PipelineEvent::TaskSubmitted { .. } => "taskSubmitted",
            PipelineEvent::TaskStatusChanged { .. } => "taskStatusChanged",
            PipelineEvent::SubtaskRetrying { .. } => "subtaskRetrying",
            PipelineEvent::SubtaskFinished { .. } => "subtaskFinished",
            PipelineEvent::TaskFinished { .. } => "taskFinished",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(PipelineEvent::TaskStatusChanged {
            task_id: "t1".into(),
            from: TaskStatus::Pending,
            to: TaskStatus::Validating,
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id(), Some("t1"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "taskStatusChanged");
        assert_eq!(json["taskId"], "t1");
        assert_eq!(json["to"], "VALIDATING");
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(PipelineEvent::TaskSubmitted {
            task_id: "t".into(),
            capability_name: "c".into(),
        });
    }
}
