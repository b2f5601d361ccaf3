//! Shared application state for the HTTP, RPC and CLI surfaces.

use std::sync::Arc;

use crate::config::DocflowConfig;
use crate::db::Database;
use crate::dispatch::Dispatcher;
use crate::error::DocflowError;
use crate::events::EventBus;
use crate::pipeline::{Orchestrator, RecoveryReport};
use crate::registry::CapabilityRegistry;
use crate::resolver::FileResolver;
use crate::router::{Classifier, Router};
use crate::store::{CapabilityStore, TaskStore};
use crate::worker::{HttpWorkerClient, WorkerClient};

/// Shared state accessible by all handlers.
pub struct AppStateInner {
    pub db: Database,
    pub config: DocflowConfig,
    pub registry: CapabilityRegistry,
    pub task_store: TaskStore,
    pub orchestrator: Orchestrator,
    pub router: Arc<Router>,
    pub resolver: FileResolver,
    pub dispatcher: Dispatcher,
    pub event_bus: EventBus,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Wire the production collaborators: HTTP workers and the classifier
    /// named in the config.
    pub fn new(db: Database, config: DocflowConfig) -> Result<Self, DocflowError> {
        let classifier = config.build_classifier()?;
        Ok(Self::with_components(
            db,
            config,
            Arc::new(HttpWorkerClient::new()),
            classifier,
        ))
    }

    pub fn with_components(
        db: Database,
        config: DocflowConfig,
        worker: Arc<dyn WorkerClient>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let event_bus = EventBus::new();
        let registry = CapabilityRegistry::new(CapabilityStore::new(db.clone()));
        let task_store = TaskStore::new(db.clone());
        let orchestrator = Orchestrator::new(
            task_store.clone(),
            worker,
            event_bus.clone(),
            config.pipeline_config(),
        );
        let router = Arc::new(Router::new(
            registry.clone(),
            classifier,
            event_bus.clone(),
            config.router_config(),
        ));
        let resolver = FileResolver::new(&config.resolver.root, config.resolver.fuzzy_match);
        let dispatcher = Dispatcher::new(
            registry.clone(),
            router.clone(),
            resolver.clone(),
            orchestrator.clone(),
        );
        Self {
            db,
            config,
            registry,
            task_store,
            orchestrator,
            router,
            resolver,
            dispatcher,
            event_bus,
        }
    }

    /// Upsert the capabilities listed in the config.
    pub async fn register_configured(&self) -> Result<usize, DocflowError> {
        for capability in &self.config.capabilities {
            self.registry.register(capability.clone()).await?;
        }
        Ok(self.config.capabilities.len())
    }

    /// Register configured capabilities, then resume tasks left in flight by
    /// a previous process. Long-running hosts call this once at startup.
    pub async fn initialize(&self) -> Result<RecoveryReport, DocflowError> {
        self.register_configured().await?;
        let report = self.orchestrator.recover().await?;
        if !report.resumed.is_empty() || !report.interrupted.is_empty() {
            tracing::info!(
                resumed = report.resumed.len(),
                interrupted = report.interrupted.len(),
                "[State] Recovered unfinished tasks"
            );
        }
        Ok(report)
    }
}
