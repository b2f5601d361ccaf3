use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::DocflowError;
use crate::models::task::{FailureReason, Task, TaskStatus};

const SELECT_COLUMNS: &str = "SELECT id, capability_name, endpoint_uri, timeout_secs, session_id, \
     parameters, resolved_files, payload, status, failure_reason, subtasks, attempt_count, errors, \
     created_at, updated_at, completed_at FROM tasks";

/// Durable task history. Every checkpoint is a full-row upsert.
#[derive(Clone)]
pub struct TaskStore {
    db: Database,
}

impl TaskStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, task: &Task) -> Result<(), DocflowError> {
        let t = task.clone();
        let to_json = |v: serde_json::Result<String>| v.map_err(|e| DocflowError::Internal(e.to_string()));
        let parameters = to_json(serde_json::to_string(&t.parameters))?;
        let resolved_files = to_json(serde_json::to_string(&t.resolved_files))?;
        let payload = to_json(serde_json::to_string(&t.payload))?;
        let subtasks = to_json(serde_json::to_string(&t.subtasks))?;
        let errors = to_json(serde_json::to_string(&t.errors))?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (id, capability_name, endpoint_uri, timeout_secs, session_id, \
                     parameters, resolved_files, payload, status, failure_reason, subtasks, \
                     attempt_count, errors, created_at, updated_at, completed_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16) \
                     ON CONFLICT(id) DO UPDATE SET \
                       status = excluded.status, \
                       failure_reason = excluded.failure_reason, \
                       subtasks = excluded.subtasks, \
                       attempt_count = excluded.attempt_count, \
                       errors = excluded.errors, \
                       updated_at = excluded.updated_at, \
                       completed_at = excluded.completed_at",
                    rusqlite::params![
                        t.id,
                        t.capability_name,
                        t.endpoint_uri,
                        t.timeout_secs.map(|v| v as i64),
                        t.session_id,
                        parameters,
                        resolved_files,
                        payload,
                        t.status.as_str(),
                        t.failure_reason.map(|r| r.as_str()),
                        subtasks,
                        t.attempt_count as i64,
                        errors,
                        t.created_at.timestamp_millis(),
                        t.updated_at.timestamp_millis(),
                        t.completed_at.map(|c| c.timestamp_millis()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Task>, DocflowError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_task(row)),
                )
                .optional()
            })
            .await
    }

    /// Newest first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>, DocflowError> {
        let limit = limit as i64;
        self.db
            .with_conn_async(move |conn| {
                let rows = match status {
                    Some(status) => {
                        let mut stmt = conn.prepare(&format!(
                            "{} WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2",
                            SELECT_COLUMNS
                        ))?;
                        let rows = stmt
                            .query_map(rusqlite::params![status.as_str(), limit], |row| {
                                Ok(row_to_task(row))
                            })?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "{} ORDER BY created_at DESC LIMIT ?1",
                            SELECT_COLUMNS
                        ))?;
                        let rows = stmt
                            .query_map(rusqlite::params![limit], |row| Ok(row_to_task(row)))?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(rows)
            })
            .await
    }

    /// Tasks that were still in flight when last checkpointed, oldest first.
    pub async fn list_unfinished(&self) -> Result<Vec<Task>, DocflowError> {
        self.db
            .with_conn_async(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE status IN ('PENDING', 'VALIDATING', 'GENERATING', 'MERGING') \
                     ORDER BY created_at ASC",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_task(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DocflowError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?;
                Ok(n > 0)
            })
            .await
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> Task {
    use chrono::TimeZone;
    let to_dt = |ms: Option<i64>| ms.and_then(|v| Utc.timestamp_millis_opt(v).single());
    let json_col = |idx: usize| row.get::<_, String>(idx).unwrap_or_default();
    let status_str: String = row.get(8).unwrap_or_default();
    let reason: Option<String> = row.get(9).unwrap_or(None);

    Task {
        id: row.get(0).unwrap_or_default(),
        capability_name: row.get(1).unwrap_or_default(),
        endpoint_uri: row.get(2).unwrap_or_default(),
        timeout_secs: row
            .get::<_, Option<i64>>(3)
            .unwrap_or(None)
            .map(|t| t.max(0) as u64),
        session_id: row.get(4).unwrap_or(None),
        parameters: serde_json::from_str(&json_col(5)).unwrap_or_default(),
        resolved_files: serde_json::from_str(&json_col(6)).unwrap_or_default(),
        payload: serde_json::from_str(&json_col(7)).unwrap_or(serde_json::Value::Null),
        status: TaskStatus::from_str(&status_str).unwrap_or(TaskStatus::Failed),
        failure_reason: reason.as_deref().and_then(FailureReason::from_str),
        subtasks: serde_json::from_str(&json_col(10)).unwrap_or_default(),
        attempt_count: row.get::<_, i64>(11).unwrap_or(0).max(0) as u32,
        errors: serde_json::from_str(&json_col(12)).unwrap_or_default(),
        created_at: to_dt(row.get(13).ok()).unwrap_or_else(crate::models::now),
        updated_at: to_dt(row.get(14).ok()).unwrap_or_else(crate::models::now),
        completed_at: to_dt(row.get(15).unwrap_or(None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::files::ResolvedFileSet;
    use crate::models::routing::{ParamValue, Parameters};

    fn sample(id: &str) -> Task {
        let mut params = Parameters::new();
        params.insert("client_name".into(), ParamValue::from("CEP"));
        params.insert("wave_number".into(), ParamValue::from(6));
        Task::new(
            id.into(),
            "Open Negotiation Agent".into(),
            "http://localhost:8000/run".into(),
            Some(30),
            Some("session-1".into()),
            params,
            ResolvedFileSet::new(),
            serde_json::json!({"wave_number": 6}),
            &["groups".to_string(), "notices".to_string()],
        )
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let store = TaskStore::new(Database::open_in_memory().unwrap());
        let mut task = sample("t1");
        store.save(&task).await.unwrap();

        task.transition(TaskStatus::Validating).unwrap();
        task.attempt_count = 1;
        store.save(&task).await.unwrap();

        let loaded = store.get("t1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Validating);
        assert_eq!(loaded.attempt_count, 1);
        assert_eq!(loaded.subtasks.len(), 4);
        assert_eq!(loaded.parameters["wave_number"], ParamValue::Number(6.0));
        assert_eq!(loaded.timeout_secs, Some(30));
        assert_eq!(loaded.payload["wave_number"], 6);
    }

    #[tokio::test]
    async fn test_list_filters_and_unfinished() {
        let store = TaskStore::new(Database::open_in_memory().unwrap());
        let pending = sample("a");
        let mut failed = sample("b");
        failed
            .fail(FailureReason::Cancelled, "cancelled by caller")
            .unwrap();
        store.save(&pending).await.unwrap();
        store.save(&failed).await.unwrap();

        assert_eq!(store.list(None, 10).await.unwrap().len(), 2);
        let only_failed = store.list(Some(TaskStatus::Failed), 10).await.unwrap();
        assert_eq!(only_failed.len(), 1);
        assert_eq!(only_failed[0].failure_reason, Some(FailureReason::Cancelled));

        let unfinished = store.list_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, "a");
        assert_eq!(store.list(None, 1).await.unwrap().len(), 1);
    }
}
