//! Capability registry: the durable name → descriptor mapping.
//!
//! Adding a capability is a data mutation. Endpoints are not probed at
//! registration time; an unreachable worker surfaces later as a runtime
//! failure of the task that calls it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::DocflowError;
use crate::models::capability::{CapabilityDescriptor, CapabilitySummary};
use crate::store::CapabilityStore;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "for", "of", "the", "to", "in", "on", "with", "please", "me", "my",
];

/// A registry search hit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityMatch {
    pub capability: CapabilityDescriptor,
    pub score: f64,
}

#[derive(Clone)]
pub struct CapabilityRegistry {
    store: CapabilityStore,
    name_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CapabilityRegistry {
    pub fn new(store: CapabilityStore) -> Self {
        Self {
            store,
            name_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.name_locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Idempotent upsert by name.
    pub async fn register(
        &self,
        mut descriptor: CapabilityDescriptor,
    ) -> Result<CapabilityDescriptor, DocflowError> {
        descriptor.validate()?;
        descriptor.name = descriptor.name.trim().to_string();

        let lock = self.lock_for(&descriptor.name).await;
        let _guard = lock.lock().await;

        let now = crate::models::now();
        match self.store.get(&descriptor.name).await? {
            Some(existing) => descriptor.created_at = existing.created_at,
            None => descriptor.created_at = now,
        }
        descriptor.updated_at = now;
        self.store.save(&descriptor).await?;

        tracing::info!(
            capability = %descriptor.name,
            endpoint = %descriptor.endpoint_uri,
            "[Registry] Capability registered"
        );
        Ok(descriptor)
    }

    pub async fn lookup(&self, name: &str) -> Result<CapabilityDescriptor, DocflowError> {
        self.store
            .get(name)
            .await?
            .ok_or_else(|| DocflowError::NotFound(format!("Capability '{}' not found", name)))
    }

    pub async fn all(&self) -> Result<Vec<CapabilityDescriptor>, DocflowError> {
        self.store.list().await
    }

    pub async fn remove(&self, name: &str) -> Result<(), DocflowError> {
        let lock = self.lock_for(name).await;
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete(name).await?
        };
        self.release_lock(name, lock).await;

        if deleted {
            tracing::info!(capability = %name, "[Registry] Capability removed");
            Ok(())
        } else {
            Err(DocflowError::NotFound(format!("Capability '{}' not found", name)))
        }
    }

    /// Drop the per-name lock once no other caller holds it.
    async fn release_lock(&self, name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.name_locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(name);
        }
    }

    /// `{name, description, parameters}` context handed to classifiers.
    pub async fn summaries(&self) -> Result<Vec<CapabilitySummary>, DocflowError> {
        Ok(self.all().await?.iter().map(CapabilitySummary::from).collect())
    }

    /// Free-text lookup ranked by token overlap, best first. Zero-score
    /// capabilities are left out.
    pub async fn search(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<CapabilityMatch>, DocflowError> {
        let mut hits: Vec<CapabilityMatch> = self
            .all()
            .await?
            .into_iter()
            .filter_map(|capability| {
                let score = similarity(text, &capability.name, &capability.description);
                (score > 0.0).then_some(CapabilityMatch { capability, score })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.capability.name.cmp(&b.capability.name))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Lowercased word tokens without stopwords or bare numbers. A trailing
/// plural `s` is dropped so "documents" matches "document".
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| match t.strip_suffix('s') {
            Some(stem) if stem.len() >= 3 && !stem.ends_with('s') => stem.to_string(),
            _ => t,
        })
        .collect()
}

/// Share of query tokens found in the capability's name and description, in [0, 1].
pub fn similarity(query: &str, name: &str, description: &str) -> f64 {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let mut corpus = tokenize(name);
    corpus.extend(tokenize(description));
    let hits = query_tokens.iter().filter(|t| corpus.contains(*t)).count();
    hits as f64 / query_tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new(CapabilityStore::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_register_lookup_round_trip() {
        let registry = registry();
        let cap = CapabilityDescriptor::new("Open Negotiation Agent", "http://localhost:8000/run")
            .with_input("excel", "{client_name} W{wave_number}*.xlsx")
            .with_input("template", "*Template*.docx");
        registry.register(cap.clone()).await.unwrap();

        let found = registry.lookup("Open Negotiation Agent").await.unwrap();
        assert_eq!(found.endpoint_uri, cap.endpoint_uri);
        assert_eq!(found.input_patterns, cap.input_patterns);
        assert!(matches!(
            registry.lookup("nope").await,
            Err(DocflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reregistration_is_idempotent() {
        let registry = registry();
        let first = registry
            .register(CapabilityDescriptor::new("cap", "http://one"))
            .await
            .unwrap();
        let second = registry
            .register(CapabilityDescriptor::new("cap", "http://two"))
            .await
            .unwrap();

        let all = registry.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].endpoint_uri, "http://two");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_serialize() {
        let registry = registry();
        let mut handles = Vec::new();
        for i in 0..8 {
            let r = registry.clone();
            handles.push(tokio::spawn(async move {
                r.register(CapabilityDescriptor::new("shared", format!("http://w{}", i)))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(registry.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_malformed_descriptor() {
        let registry = registry();
        let err = registry
            .register(CapabilityDescriptor::new("", "http://x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocflowError::InvalidDescriptor(_)));
        assert!(registry.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_created_at_matches_stored_value() {
        let registry = registry();
        let registered = registry
            .register(CapabilityDescriptor::new("cap", "http://one"))
            .await
            .unwrap();
        let stored = registry.lookup("cap").await.unwrap();
        assert_eq!(registered.created_at, stored.created_at);
        assert_eq!(registered.updated_at, stored.updated_at);

        let again = registry
            .register(CapabilityDescriptor::new("cap", "http://two"))
            .await
            .unwrap();
        assert_eq!(again.created_at, registered.created_at);
    }

    #[tokio::test]
    async fn test_rejects_broken_templates_without_writing() {
        let registry = registry();
        let undeclared_file = CapabilityDescriptor::new("Broken", "http://x")
            .with_input("excel", "{client_name}*.xlsx")
            .with_mapping("excel_path", "{files.nope}");
        assert!(matches!(
            registry.register(undeclared_file).await,
            Err(DocflowError::InvalidDescriptor(_))
        ));

        let uncovered = CapabilityDescriptor::new("Broken", "http://x")
            .with_input("excel", "{client_name} W{wave_number}*.xlsx")
            .with_parameters(["client_name"]);
        assert!(matches!(
            registry.register(uncovered).await,
            Err(DocflowError::InvalidDescriptor(_))
        ));

        assert!(registry.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_releases_name_lock() {
        let registry = registry();
        registry
            .register(CapabilityDescriptor::new("temp", "http://x"))
            .await
            .unwrap();
        registry.remove("temp").await.unwrap();
        assert!(registry.name_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_search_and_remove() {
        let registry = registry();
        registry
            .register(
                CapabilityDescriptor::new("Open Negotiation Agent", "http://a")
                    .with_description("Generates negotiation notices and group documents"),
            )
            .await
            .unwrap();
        registry
            .register(
                CapabilityDescriptor::new("Invoice Agent", "http://b")
                    .with_description("Builds invoices"),
            )
            .await
            .unwrap();

        let hits = registry.search("negotiation documents", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].capability.name, "Open Negotiation Agent");
        assert!((hits[0].score - 1.0).abs() < f64::EPSILON);

        registry.remove("Invoice Agent").await.unwrap();
        assert!(matches!(
            registry.remove("Invoice Agent").await,
            Err(DocflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("Create documents for CEP Wave 6");
        let expected: BTreeSet<String> = ["create", "document", "cep", "wave"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }
}
