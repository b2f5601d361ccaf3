//! HTTP surface tests: the full router on an ephemeral port, driven with
//! `reqwest`, backed by an in-memory database and an in-process worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use docflow_core::config::DocflowConfig;
use docflow_core::router::KeywordClassifier;
use docflow_core::worker::{WorkerClient, WorkerError, WorkerRequest, WorkerResponse, WorkerStage};
use docflow_core::{AppState, AppStateInner, Database};
use docflow_server::{start_server_with_state, ServerConfig};

/// Succeeds every call; generation waits `generate_delay` first.
struct LocalWorker {
    generate_delay: Duration,
}

#[async_trait]
impl WorkerClient for LocalWorker {
    async fn invoke(
        &self,
        _endpoint: &str,
        request: &WorkerRequest,
        _timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError> {
        match request.stage {
            WorkerStage::Validate => Ok(WorkerResponse::success(vec![])),
            WorkerStage::Generate => {
                tokio::time::sleep(self.generate_delay).await;
                Ok(WorkerResponse::success(vec![format!(
                    "out/{}.xlsx",
                    request.generator.as_deref().unwrap_or("document")
                )]))
            }
            WorkerStage::Merge => Ok(WorkerResponse::success(vec!["out/final.zip".into()])),
        }
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    _dir: tempfile::TempDir,
}

async fn start(generate_delay: Duration) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("CEP W6 roster.xlsx"), b"roster").unwrap();

    let mut config = DocflowConfig::default();
    config.resolver.root = dir.path().display().to_string();
    config.pipeline.retry_base_delay_ms = 1;
    config.pipeline.retry_max_delay_ms = 5;

    let state: AppState = Arc::new(AppStateInner::with_components(
        Database::open_in_memory().unwrap(),
        config,
        Arc::new(LocalWorker { generate_delay }),
        Arc::new(KeywordClassifier::new()),
    ));
    let addr = start_server_with_state(
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            db_path: ":memory:".into(),
        },
        state,
    )
    .await
    .unwrap();

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

fn negotiation_capability() -> Value {
    json!({
        "name": "Open Negotiation Agent",
        "endpointUri": "http://worker.invalid/run",
        "description": "Generate open negotiation notices for a client wave",
        "inputPatterns": [{ "name": "excel", "pattern": "{client_name} W{wave_number}*.xlsx" }],
        "payloadMapping": {
            "excel_path": "resolved_excel_path",
            "wave": "{wave_number}"
        },
        "parameters": ["client_name", "wave_number"],
        "generators": ["groups", "notices"]
    })
}

impl TestServer {
    async fn register(&self) {
        let resp = self
            .client
            .post(format!("{}/api/capabilities", self.base))
            .json(&negotiation_capability())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    async fn wait_terminal(&self, task_id: &str) -> Value {
        for _ in 0..200 {
            let body: Value = self
                .client
                .get(format!("{}/api/tasks/{}", self.base, task_id))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            let status = body["task"]["status"].as_str().unwrap_or_default().to_string();
            if matches!(status.as_str(), "COMPLETED" | "PARTIAL" | "FAILED") {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task {} never finished", task_id);
    }
}

#[tokio::test]
async fn test_health() {
    let server = start(Duration::ZERO).await;
    let body: Value = server
        .client
        .get(format!("{}/api/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_capability_crud_and_search() {
    let server = start(Duration::ZERO).await;
    server.register().await;
    server.register().await;

    let list: Value = server
        .client
        .get(format!("{}/api/capabilities", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["capabilities"].as_array().unwrap().len(), 1);

    let found: Value = server
        .client
        .get(format!("{}/api/capabilities/search?q=negotiation%20notices", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["matches"][0]["capability"]["name"], "Open Negotiation Agent");

    let one = server
        .client
        .get(format!("{}/api/capabilities/Open%20Negotiation%20Agent", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(one.status(), 200);

    let bad = server
        .client
        .post(format!("{}/api/capabilities", server.base))
        .json(&json!({ "name": " ", "endpointUri": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);

    let deleted = server
        .client
        .delete(format!("{}/api/capabilities/Open%20Negotiation%20Agent", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);
    let missing = server
        .client
        .get(format!("{}/api/capabilities/Open%20Negotiation%20Agent", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_route_errors_map_to_status_codes() {
    let server = start(Duration::ZERO).await;

    let no_route = server
        .client
        .post(format!("{}/api/route", server.base))
        .json(&json!({ "query": "Create notices for CEP Wave 6" }))
        .send()
        .await
        .unwrap();
    assert_eq!(no_route.status(), 422);
    let body: Value = no_route.json().await.unwrap();
    assert_eq!(body["kind"], "NoRoute");

    server.register().await;
    let decision: Value = server
        .client
        .post(format!("{}/api/route", server.base))
        .json(&json!({ "query": "Create negotiation notices for CEP Wave 6" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(decision["capabilityName"], "Open Negotiation Agent");
    assert_eq!(decision["extractedParameters"]["wave_number"], 6.0);
}

#[tokio::test]
async fn test_resolve_dry_run() {
    let server = start(Duration::ZERO).await;
    server.register().await;

    let report: Value = server
        .client
        .post(format!("{}/api/resolve", server.base))
        .json(&json!({
            "capability": "Open Negotiation Agent",
            "parameters": { "client_name": "CEP", "wave_number": 6 }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["fileInfo"][0]["exists"], true);
    assert_eq!(report["fileInfo"][0]["size"], 6);

    let missing = server
        .client
        .post(format!("{}/api/resolve", server.base))
        .json(&json!({
            "capability": "Open Negotiation Agent",
            "parameters": { "client_name": "CEP", "wave_number": 7 }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 422);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["kind"], "MissingInput");
}

#[tokio::test]
async fn test_submit_query_runs_to_completion() {
    let server = start(Duration::ZERO).await;
    server.register().await;

    let resp = server
        .client
        .post(format!("{}/api/tasks", server.base))
        .json(&json!({ "query": "Create negotiation notices for CEP Wave 6" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let receipt: Value = resp.json().await.unwrap();
    assert_eq!(receipt["routing"]["capabilityName"], "Open Negotiation Agent");
    let task_id = receipt["taskId"].as_str().unwrap().to_string();

    let body = server.wait_terminal(&task_id).await;
    assert_eq!(body["task"]["status"], "COMPLETED");
    assert_eq!(body["task"]["payload"]["wave"], 6);
    assert_eq!(body["outcome"]["artifactsByGenerator"]["groups"][0], "out/groups.xlsx");
    assert_eq!(body["outcome"]["stageStats"]["generate"]["succeeded"], 2);

    // The listing reads the store, which trails the live snapshot briefly.
    let mut listed = 0;
    for _ in 0..50 {
        let list: Value = server
            .client
            .get(format!("{}/api/tasks?status=COMPLETED", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        listed = list["tasks"].as_array().unwrap().len();
        if listed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(listed, 1);

    let again = server
        .client
        .post(format!("{}/api/tasks/{}/cancel", server.base, task_id))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 409);
}

#[tokio::test]
async fn test_cancel_in_flight_task() {
    let server = start(Duration::from_secs(5)).await;
    server.register().await;

    let receipt: Value = server
        .client
        .post(format!("{}/api/tasks", server.base))
        .json(&json!({
            "capability": "Open Negotiation Agent",
            "parameters": { "client_name": "CEP", "wave_number": 6 }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let task_id = receipt["taskId"].as_str().unwrap().to_string();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cancelled: Value = server
        .client
        .post(format!("{}/api/tasks/{}/cancel", server.base, task_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cancelled["task"]["status"], "FAILED");
    assert_eq!(cancelled["task"]["failureReason"], "CANCELLED");

    let body = server.wait_terminal(&task_id).await;
    assert_eq!(body["outcome"]["failureReason"], "CANCELLED");
}

#[tokio::test]
async fn test_event_stream_ends_with_task_finished() {
    let server = start(Duration::from_millis(300)).await;
    server.register().await;

    let receipt: Value = server
        .client
        .post(format!("{}/api/tasks", server.base))
        .json(&json!({
            "capability": "Open Negotiation Agent",
            "parameters": { "client_name": "CEP", "wave_number": 6 }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let task_id = receipt["taskId"].as_str().unwrap();

    let resp = server
        .client
        .get(format!("{}/api/tasks/{}/events", server.base, task_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let text = tokio::time::timeout(Duration::from_secs(10), resp.text())
        .await
        .unwrap()
        .unwrap();
    assert!(text.contains("event: snapshot"));
    assert!(text.contains("event: subtaskFinished"));
    assert!(text.contains("event: taskFinished"));
    assert!(text.contains("COMPLETED"));
}

#[tokio::test]
async fn test_rpc_endpoint() {
    let server = start(Duration::ZERO).await;

    let methods: Value = server
        .client
        .get(format!("{}/api/rpc/methods", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(methods["methods"]
        .as_array()
        .unwrap()
        .contains(&json!("tasks.submit")));

    let batch: Value = server
        .client
        .post(format!("{}/api/rpc", server.base))
        .json(&json!([
            { "jsonrpc": "2.0", "id": 1, "method": "capabilities.register", "params": negotiation_capability() },
            { "jsonrpc": "2.0", "id": 2, "method": "capabilities.list" },
            { "jsonrpc": "2.0", "id": 3, "method": "nope.nothing" }
        ]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let responses = batch.as_array().unwrap();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["result"]["capability"]["name"], "Open Negotiation Agent");
    assert_eq!(responses[1]["result"]["capabilities"].as_array().unwrap().len(), 1);
    assert_eq!(responses[2]["error"]["code"], -32601);
}
