//! Submission surface: route → lookup → resolve → admit.
//!
//! Routing and resolution run synchronously in the caller, so their errors
//! come straight back and no task is created. Once a task is admitted the
//! caller only gets its id; the outcome is observed through the status
//! surface.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DocflowError;
use crate::models::files::{FileInfo, ResolvedFileSet};
use crate::models::routing::{Parameters, Request, RoutingDecision};
use crate::pipeline::{Orchestrator, Submission};
use crate::registry::CapabilityRegistry;
use crate::resolver::FileResolver;
use crate::router::Router;
use crate::worker::payload::check_parameters;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionReport {
    pub capability: String,
    pub files: ResolvedFileSet,
    pub file_info: Vec<FileInfo>,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: CapabilityRegistry,
    router: Arc<Router>,
    resolver: FileResolver,
    orchestrator: Orchestrator,
}

impl Dispatcher {
    pub fn new(
        registry: CapabilityRegistry,
        router: Arc<Router>,
        resolver: FileResolver,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            registry,
            router,
            resolver,
            orchestrator,
        }
    }

    /// Route free text to a capability and admit a task for it.
    pub async fn submit_query(
        &self,
        text: &str,
        session_id: Option<String>,
    ) -> Result<SubmitReceipt, DocflowError> {
        let request = Request::new(text, session_id.clone());
        let decision = self.router.route(&request).await?;
        let task_id = self
            .admit(
                &decision.capability_name,
                decision.extracted_parameters.clone(),
                None,
                session_id,
            )
            .await?;
        Ok(SubmitReceipt {
            task_id,
            routing: Some(decision),
        })
    }

    /// Admit a task for a named capability, skipping classification.
    pub async fn submit_explicit(
        &self,
        capability: &str,
        parameters: Parameters,
        overrides: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> Result<SubmitReceipt, DocflowError> {
        let task_id = self
            .admit(capability, parameters, overrides, session_id)
            .await?;
        Ok(SubmitReceipt {
            task_id,
            routing: None,
        })
    }

    /// Dry-run resolution for a capability.
    pub async fn resolve_only(
        &self,
        capability: &str,
        parameters: Parameters,
    ) -> Result<ResolutionReport, DocflowError> {
        let descriptor = self.registry.lookup(capability).await?;
        let files = self
            .resolver
            .resolve_async(descriptor.input_patterns.clone(), parameters)
            .await?;
        let file_info = files.iter().map(|f| self.resolver.describe(&f.path)).collect();
        Ok(ResolutionReport {
            capability: descriptor.name,
            files,
            file_info,
        })
    }

    async fn admit(
        &self,
        capability: &str,
        parameters: Parameters,
        overrides: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> Result<String, DocflowError> {
        let descriptor = self.registry.lookup(capability).await?;
        check_parameters(&descriptor, &parameters)?;
        let resolved_files = self
            .resolver
            .resolve_async(descriptor.input_patterns.clone(), parameters.clone())
            .await?;
        let task = self
            .orchestrator
            .submit(Submission {
                capability: descriptor,
                parameters,
                resolved_files,
                payload_overrides: overrides,
                session_id,
            })
            .await?;
        Ok(task.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::db::Database;
    use crate::events::EventBus;
    use crate::models::capability::{CapabilityDescriptor, CapabilitySummary};
    use crate::models::routing::{Classification, ParamValue};
    use crate::models::task::TaskStatus;
    use crate::pipeline::{PipelineConfig, RetryPolicy};
    use crate::router::{Classifier, KeywordClassifier, RouterConfig};
    use crate::store::{CapabilityStore, TaskStore};
    use crate::worker::{WorkerClient, WorkerError, WorkerRequest, WorkerResponse};

    struct EchoWorker;

    #[async_trait]
    impl WorkerClient for EchoWorker {
        async fn invoke(
            &self,
            _endpoint: &str,
            request: &WorkerRequest,
            _timeout: Duration,
        ) -> Result<WorkerResponse, WorkerError> {
            Ok(WorkerResponse::success(vec![format!(
                "out/{}.docx",
                request.generator.as_deref().unwrap_or("merged")
            )]))
        }
    }

    struct Fixed(Vec<Classification>);

    #[async_trait]
    impl Classifier for Fixed {
        async fn classify(
            &self,
            _text: &str,
            _context: &[CapabilitySummary],
        ) -> Result<Vec<Classification>, DocflowError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        orchestrator: Orchestrator,
        registry: CapabilityRegistry,
        _dir: tempfile::TempDir,
    }

    async fn fixture(classifier: Arc<dyn Classifier>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CEP W6 roster.xlsx"), b"x").unwrap();

        let db = Database::open_in_memory().unwrap();
        let events = EventBus::new();
        let registry = CapabilityRegistry::new(CapabilityStore::new(db.clone()));
        registry
            .register(
                CapabilityDescriptor::new("Open Negotiation Agent", "http://worker/run")
                    .with_description("open negotiation notices for a client wave")
                    .with_input("excel", "{client_name} W{wave_number}*.xlsx")
                    .with_parameters(["client_name", "wave_number"]),
            )
            .await
            .unwrap();
        let orchestrator = Orchestrator::new(
            TaskStore::new(db),
            Arc::new(EchoWorker),
            events.clone(),
            PipelineConfig {
                retry: RetryPolicy::none(),
                call_timeout: Duration::from_millis(200),
                allow_partial: true,
            },
        );
        let router = Arc::new(Router::new(
            registry.clone(),
            classifier,
            events,
            RouterConfig::default(),
        ));
        let dispatcher = Dispatcher::new(
            registry.clone(),
            router,
            FileResolver::new(dir.path(), false),
            orchestrator.clone(),
        );
        Fixture {
            dispatcher,
            orchestrator,
            registry,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_submit_query_routes_and_completes() {
        let f = fixture(Arc::new(KeywordClassifier::new())).await;
        let receipt = f
            .dispatcher
            .submit_query("Run open negotiation for CEP Wave 6", None)
            .await
            .unwrap();
        let routing = receipt.routing.unwrap();
        assert_eq!(routing.capability_name, "Open Negotiation Agent");
        assert_eq!(
            routing.extracted_parameters.get("wave_number"),
            Some(&ParamValue::Number(6.0))
        );

        let task = f
            .orchestrator
            .wait(&receipt.task_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.resolved_files.path_of("excel").unwrap().ends_with("CEP W6 roster.xlsx"));
    }

    #[tokio::test]
    async fn test_missing_input_creates_no_task() {
        let f = fixture(Arc::new(Fixed(vec![Classification {
            label: "Open Negotiation Agent".into(),
            parameters: [
                ("client_name".to_string(), ParamValue::Text("CEP".into())),
                ("wave_number".to_string(), ParamValue::Number(9.0)),
            ]
            .into_iter()
            .collect(),
            confidence: 0.9,
        }])))
        .await;

        let err = f.dispatcher.submit_query("wave nine", None).await.unwrap_err();
        assert!(matches!(err, DocflowError::MissingInput(ref p) if p == "CEP W9*.xlsx"));
        assert!(f.orchestrator.list(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_route_creates_no_task() {
        let params: Parameters = [
            ("client_name".to_string(), ParamValue::Text("CEP".into())),
            ("wave_number".to_string(), ParamValue::Number(6.0)),
        ]
        .into_iter()
        .collect();
        let candidate = |label: &str, confidence: f64| Classification {
            label: label.into(),
            parameters: params.clone(),
            confidence,
        };
        let f = fixture(Arc::new(Fixed(vec![
            candidate("Open Negotiation Agent", 0.85),
            candidate("Renewal Agent", 0.83),
        ])))
        .await;
        f.registry
            .register(
                CapabilityDescriptor::new("Renewal Agent", "http://worker/renew")
                    .with_input("excel", "{client_name} W{wave_number}*.xlsx")
                    .with_parameters(["client_name", "wave_number"]),
            )
            .await
            .unwrap();

        let err = f
            .dispatcher
            .submit_query("documents for CEP Wave 6", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DocflowError::AmbiguousRoute(ref names) if names.len() == 2));
        assert!(f.orchestrator.list(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_submission_checks_parameters_first() {
        let f = fixture(Arc::new(KeywordClassifier::new())).await;
        let mut params = Parameters::new();
        params.insert("client_name".into(), ParamValue::Text("CEP".into()));
        let err = f
            .dispatcher
            .submit_explicit("Open Negotiation Agent", params.clone(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DocflowError::InvalidParameters(_)));

        params.insert("wave_number".into(), ParamValue::Number(6.0));
        let receipt = f
            .dispatcher
            .submit_explicit("Open Negotiation Agent", params, None, None)
            .await
            .unwrap();
        assert!(receipt.routing.is_none());

        let err = f
            .dispatcher
            .submit_explicit("Nope", Parameters::new(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DocflowError::NotFound(_)));
        assert_eq!(f.registry.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_only_reports_file_info() {
        let f = fixture(Arc::new(KeywordClassifier::new())).await;
        let params: Parameters = [
            ("client_name".to_string(), ParamValue::Text("CEP".into())),
            ("wave_number".to_string(), ParamValue::Number(6.0)),
        ]
        .into_iter()
        .collect();
        let report = f
            .dispatcher
            .resolve_only("Open Negotiation Agent", params)
            .await
            .unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.file_info.len(), 1);
        assert!(report.file_info[0].exists);
        assert_eq!(report.file_info[0].size, Some(1));
        assert_eq!(report.file_info[0].name.as_deref(), Some("CEP W6 roster.xlsx"));
    }
}
