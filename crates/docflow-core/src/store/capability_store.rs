use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::DocflowError;
use crate::models::capability::CapabilityDescriptor;

const SELECT_COLUMNS: &str = "SELECT name, endpoint_uri, description, input_patterns, payload_mapping, \
     parameters, generators, timeout_secs, created_at, updated_at FROM capabilities";

#[derive(Clone)]
pub struct CapabilityStore {
    db: Database,
}

impl CapabilityStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert by name. `created_at` of an existing row is kept.
    pub async fn save(&self, capability: &CapabilityDescriptor) -> Result<(), DocflowError> {
        let c = capability.clone();
        let patterns = serde_json::to_string(&c.input_patterns)
            .map_err(|e| DocflowError::Internal(e.to_string()))?;
        let mapping = serde_json::to_string(&c.payload_mapping)
            .map_err(|e| DocflowError::Internal(e.to_string()))?;
        let parameters = serde_json::to_string(&c.parameters)
            .map_err(|e| DocflowError::Internal(e.to_string()))?;
        let generators = serde_json::to_string(&c.generators)
            .map_err(|e| DocflowError::Internal(e.to_string()))?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO capabilities (name, endpoint_uri, description, input_patterns, \
                     payload_mapping, parameters, generators, timeout_secs, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                     ON CONFLICT(name) DO UPDATE SET \
                       endpoint_uri = excluded.endpoint_uri, \
                       description = excluded.description, \
                       input_patterns = excluded.input_patterns, \
                       payload_mapping = excluded.payload_mapping, \
                       parameters = excluded.parameters, \
                       generators = excluded.generators, \
                       timeout_secs = excluded.timeout_secs, \
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        c.name,
                        c.endpoint_uri,
                        c.description,
                        patterns,
                        mapping,
                        parameters,
                        generators,
                        c.timeout_secs.map(|t| t as i64),
                        c.created_at.timestamp_millis(),
                        c.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, name: &str) -> Result<Option<CapabilityDescriptor>, DocflowError> {
        let name = name.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("{} WHERE name = ?1", SELECT_COLUMNS),
                    rusqlite::params![name],
                    |row| Ok(row_to_capability(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<CapabilityDescriptor>, DocflowError> {
        self.db
            .with_conn_async(|conn| {
                let mut stmt = conn.prepare(&format!("{} ORDER BY name ASC", SELECT_COLUMNS))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_capability(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete(&self, name: &str) -> Result<bool, DocflowError> {
        let name = name.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute(
                    "DELETE FROM capabilities WHERE name = ?1",
                    rusqlite::params![name],
                )?;
                Ok(n > 0)
            })
            .await
    }
}

fn row_to_capability(row: &rusqlite::Row<'_>) -> CapabilityDescriptor {
    use chrono::TimeZone;
    let to_dt = |ms: Option<i64>| ms.and_then(|v| Utc.timestamp_millis_opt(v).single());
    let json_col = |idx: usize| row.get::<_, String>(idx).unwrap_or_default();

    CapabilityDescriptor {
        name: row.get(0).unwrap_or_default(),
        endpoint_uri: row.get(1).unwrap_or_default(),
        description: row.get(2).unwrap_or_default(),
        input_patterns: serde_json::from_str(&json_col(3)).unwrap_or_default(),
        payload_mapping: serde_json::from_str(&json_col(4)).unwrap_or_default(),
        parameters: serde_json::from_str(&json_col(5)).unwrap_or_default(),
        generators: serde_json::from_str(&json_col(6)).unwrap_or_default(),
        timeout_secs: row
            .get::<_, Option<i64>>(7)
            .unwrap_or(None)
            .map(|t| t.max(0) as u64),
        created_at: to_dt(row.get(8).ok()).unwrap_or_else(crate::models::now),
        updated_at: to_dt(row.get(9).ok()).unwrap_or_else(crate::models::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CapabilityStore {
        CapabilityStore::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let store = store();
        let cap = CapabilityDescriptor::new("Open Negotiation Agent", "http://localhost:8000/run")
            .with_description("Generates open negotiation notices")
            .with_input("excel", "{client_name} W{wave_number}*.xlsx")
            .with_mapping("wave", "{wave_number}")
            .with_generators(["groups", "notices"]);
        store.save(&cap).await.unwrap();

        let loaded = store.get("Open Negotiation Agent").await.unwrap().unwrap();
        assert_eq!(loaded.endpoint_uri, cap.endpoint_uri);
        assert_eq!(loaded.input_patterns, cap.input_patterns);
        assert_eq!(loaded.payload_mapping, cap.payload_mapping);
        assert_eq!(loaded.generators, cap.generators);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_single_row() {
        let store = store();
        store
            .save(&CapabilityDescriptor::new("cap", "http://a"))
            .await
            .unwrap();
        store
            .save(&CapabilityDescriptor::new("cap", "http://b"))
            .await
            .unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].endpoint_uri, "http://b");

        assert!(store.delete("cap").await.unwrap());
        assert!(!store.delete("cap").await.unwrap());
    }
}
