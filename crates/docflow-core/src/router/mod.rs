//! Request router: raw text → [`RoutingDecision`].
//!
//! Capabilities are passed to the classifier as context on every call, so
//! a freshly registered capability is routable immediately.

pub mod classifier;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::DocflowError;
use crate::events::{EventBus, PipelineEvent};
use crate::models::capability::{CapabilityDescriptor, CapabilitySummary};
use crate::models::routing::{Classification, Request, RoutingDecision};
use crate::registry::CapabilityRegistry;

pub use classifier::{Classifier, KeywordClassifier, LlmClassifier, LlmClassifierConfig};

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Candidates below this confidence are never routed to.
    pub confidence_threshold: f64,
    /// Candidates within this distance of the best are considered tied.
    pub tie_epsilon: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            tie_epsilon: 0.05,
        }
    }
}

#[derive(Clone)]
pub struct Router {
    registry: CapabilityRegistry,
    classifier: Arc<dyn Classifier>,
    events: EventBus,
    config: RouterConfig,
}

impl Router {
    pub fn new(
        registry: CapabilityRegistry,
        classifier: Arc<dyn Classifier>,
        events: EventBus,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            classifier,
            events,
            config,
        }
    }

    pub fn config(&self) -> RouterConfig {
        self.config
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    pub async fn route(&self, request: &Request) -> Result<RoutingDecision, DocflowError> {
        let text = request.raw_text.trim();
        if text.is_empty() {
            return Err(DocflowError::BadRequest("Request text is empty".into()));
        }

        let capabilities: BTreeMap<String, CapabilityDescriptor> = self
            .registry
            .all()
            .await?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        if capabilities.is_empty() {
            return Err(DocflowError::NoRoute("no capabilities are registered".into()));
        }
        let context: Vec<CapabilitySummary> =
            capabilities.values().map(CapabilitySummary::from).collect();

        let candidates = self.classifier.classify(text, &context).await?;
        let decision = self.decide(text, candidates, &capabilities)?;

        tracing::info!(
            capability = %decision.capability_name,
            confidence = decision.confidence,
            classifier = self.classifier.name(),
            "[Router] Route decided"
        );
        self.events.publish(PipelineEvent::RouteDecided {
            capability_name: decision.capability_name.clone(),
            confidence: decision.confidence,
            parameters: decision.extracted_parameters.clone(),
        });
        Ok(decision)
    }

    /// Route raw text without a session.
    pub async fn route_text(&self, text: &str) -> Result<RoutingDecision, DocflowError> {
        self.route(&Request::new(text, None)).await
    }

    fn decide(
        &self,
        text: &str,
        candidates: Vec<Classification>,
        capabilities: &BTreeMap<String, CapabilityDescriptor>,
    ) -> Result<RoutingDecision, DocflowError> {
        // Keep the best candidate per registered capability.
        let mut best: BTreeMap<&str, Classification> = BTreeMap::new();
        for candidate in candidates {
            if !candidate.confidence.is_finite()
                || candidate.confidence < self.config.confidence_threshold
            {
                continue;
            }
            let Some((name, _)) = capabilities.get_key_value(candidate.label.as_str()) else {
                tracing::debug!(label = %candidate.label, "[Router] Dropping unregistered label");
                continue;
            };
            match best.get(name.as_str()) {
                Some(existing) if existing.confidence >= candidate.confidence => {}
                _ => {
                    best.insert(name.as_str(), candidate);
                }
            }
        }

        let top = best
            .values()
            .map(|c| c.confidence)
            .fold(f64::NEG_INFINITY, f64::max);
        if best.is_empty() {
            return Err(DocflowError::NoRoute(text.to_string()));
        }

        let band: Vec<&str> = best
            .iter()
            .filter(|(_, c)| top - c.confidence <= self.config.tie_epsilon)
            .map(|(name, _)| *name)
            .collect();

        let winner = if band.len() == 1 {
            band[0]
        } else {
            let specificity = |name: &str| {
                capabilities
                    .get(name)
                    .map(CapabilityDescriptor::specificity)
                    .unwrap_or_default()
            };
            let most = band.iter().map(|n| specificity(*n)).max().unwrap_or_default();
            let leaders: Vec<&str> = band
                .iter()
                .copied()
                .filter(|n| specificity(*n) == most)
                .collect();
            if leaders.len() > 1 {
                tracing::warn!(candidates = ?leaders, "[Router] Ambiguous route");
                return Err(DocflowError::AmbiguousRoute(
                    leaders.iter().map(|s| s.to_string()).collect(),
                ));
            }
            leaders[0]
        };

        let Some(chosen) = best.remove(winner) else {
            return Err(DocflowError::Internal(format!("Lost candidate '{}'", winner)));
        };
        let keys = capabilities
            .get(winner)
            .map(CapabilityDescriptor::parameter_keys)
            .unwrap_or_default();
        let extracted_parameters = chosen
            .parameters
            .into_iter()
            .filter(|(k, _)| keys.contains(k))
            .collect();

        Ok(RoutingDecision {
            capability_name: winner.to_string(),
            extracted_parameters,
            confidence: chosen.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::routing::{ParamValue, Parameters};
    use crate::store::CapabilityStore;
    use async_trait::async_trait;

    /// Returns a fixed candidate list regardless of input.
    struct Scripted(Vec<(&'static str, f64)>);

    #[async_trait]
    impl Classifier for Scripted {
        async fn classify(
            &self,
            _text: &str,
            _context: &[CapabilitySummary],
        ) -> Result<Vec<Classification>, DocflowError> {
            let mut params = Parameters::new();
            params.insert("client_name".into(), ParamValue::from("CEP"));
            params.insert("noise".into(), ParamValue::from("x"));
            Ok(self
                .0
                .iter()
                .map(|(label, confidence)| Classification {
                    label: label.to_string(),
                    parameters: params.clone(),
                    confidence: *confidence,
                })
                .collect())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct Unavailable;

    #[async_trait]
    impl Classifier for Unavailable {
        async fn classify(
            &self,
            _text: &str,
            _context: &[CapabilitySummary],
        ) -> Result<Vec<Classification>, DocflowError> {
            Err(DocflowError::ClassificationUnavailable("rate limited".into()))
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    async fn router_with(classifier: Arc<dyn Classifier>) -> Router {
        let registry =
            CapabilityRegistry::new(CapabilityStore::new(Database::open_in_memory().unwrap()));
        registry
            .register(
                CapabilityDescriptor::new("A", "http://a")
                    .with_input("excel", "{client_name}*.xlsx"),
            )
            .await
            .unwrap();
        registry
            .register(
                CapabilityDescriptor::new("B", "http://b")
                    .with_input("excel", "{client_name}*.xlsx"),
            )
            .await
            .unwrap();
        registry
            .register(
                CapabilityDescriptor::new("C", "http://c")
                    .with_input("excel", "{client_name}*.xlsx")
                    .with_input("template", "*Template*.docx"),
            )
            .await
            .unwrap();
        Router::new(registry, classifier, EventBus::new(), RouterConfig::default())
    }

    #[tokio::test]
    async fn test_routes_clear_winner_and_drops_unknown_keys() {
        let router = router_with(Arc::new(Scripted(vec![("A", 0.9), ("B", 0.5)]))).await;
        let decision = router.route_text("anything").await.unwrap();
        assert_eq!(decision.capability_name, "A");
        assert_eq!(decision.extracted_parameters.len(), 1);
        assert!(decision.extracted_parameters.contains_key("client_name"));
    }

    #[tokio::test]
    async fn test_ambiguous_route_on_equal_specificity() {
        let router = router_with(Arc::new(Scripted(vec![("A", 0.90), ("B", 0.88)]))).await;
        match router.route_text("anything").await {
            Err(DocflowError::AmbiguousRoute(names)) => assert_eq!(names, vec!["A", "B"]),
            other => panic!("expected AmbiguousRoute, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tie_broken_by_specificity() {
        let router = router_with(Arc::new(Scripted(vec![("A", 0.90), ("C", 0.87)]))).await;
        let decision = router.route_text("anything").await.unwrap();
        assert_eq!(decision.capability_name, "C");
    }

    #[tokio::test]
    async fn test_low_confidence_and_unregistered_are_no_route() {
        let router = router_with(Arc::new(Scripted(vec![("A", 0.4), ("Ghost", 0.99)]))).await;
        assert!(matches!(
            router.route_text("anything").await,
            Err(DocflowError::NoRoute(_))
        ));
        assert!(matches!(
            router.route_text("   ").await,
            Err(DocflowError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_classifier_outage_surfaces() {
        let router = router_with(Arc::new(Unavailable)).await;
        assert!(matches!(
            router.route_text("anything").await,
            Err(DocflowError::ClassificationUnavailable(_))
        ));
    }
}
