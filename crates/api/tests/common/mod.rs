// All functions in this module are shared test helpers. Not every test
// binary uses every helper, so dead_code warnings are suppressed.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use accelbench_api::config::ServerConfig;
use accelbench_api::hf::HfClient;
use accelbench_api::router::build_app_router;
use accelbench_api::state::AppState;
use accelbench_cluster::mock::MockCluster;
use accelbench_orchestrator::{Orchestrator, OrchestratorConfig};
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        namespace: "accelbench".to_string(),
        loadgen_image: "ghcr.io/accelbench/loadgen:latest".to_string(),
        // Point at localhost so a recommend test never reaches the real Hub.
        hf_base_url: "http://127.0.0.1:1".to_string(),
    }
}

/// Orchestration config with poll intervals shrunk for tests.
pub fn test_orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        readiness_timeout: Duration::from_secs(5),
        readiness_poll: Duration::from_millis(10),
        job_timeout: Duration::from_secs(5),
        job_poll: Duration::from_millis(10),
        ..OrchestratorConfig::default()
    }
}

/// A router wired to a mock cluster, plus the mock for assertions.
pub struct TestApp {
    pub router: Router,
    pub cluster: Arc<MockCluster>,
}

/// Build the full application router with all middleware layers over a
/// fresh mock cluster.
pub fn build_test_app(pool: PgPool) -> TestApp {
    build_test_app_with(pool, Arc::new(MockCluster::new()))
}

/// Build the test app around a caller-configured mock cluster.
pub fn build_test_app_with(pool: PgPool, cluster: Arc<MockCluster>) -> TestApp {
    let config = test_config();
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        cluster.clone() as Arc<dyn accelbench_cluster::ClusterApi>,
        test_orchestrator_config(),
    ));
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator,
        hf: Arc::new(HfClient::new(config.hf_base_url)),
    };
    TestApp {
        router: build_app_router(state),
        cluster,
    }
}

/// Issue a GET request.
pub async fn get(app: &Router, path: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Issue a POST request with a JSON body.
pub async fn post_json(app: &Router, path: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Issue a POST request with a raw (possibly malformed) body.
pub async fn post_raw(app: &Router, path: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Issue a DELETE request.
pub async fn delete(app: &Router, path: &str) -> Response<Body> {
    let request = Request::builder()
        .method("DELETE")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A well-formed run request targeting a seeded instance type.
pub fn run_request() -> serde_json::Value {
    serde_json::json!({
        "model_hf_id": "meta-llama/Llama-3.1-8B",
        "model_hf_revision": "abc123",
        "instance_type_name": "g5.xlarge",
        "framework": "vllm",
        "framework_version": "v0.6.0",
        "tensor_parallel_degree": 1,
        "concurrency": 16,
        "input_sequence_length": 512,
        "output_sequence_length": 256,
        "dataset_name": "sharegpt",
        "run_type": "on_demand",
        "min_duration_seconds": 60
    })
}

/// Poll `GET /api/v1/runs/{id}` until its status matches, or panic after
/// two seconds.
pub async fn wait_for_status(app: &Router, run_id: &str, want: &str) {
    for _ in 0..100 {
        let response = get(app, &format!("/api/v1/runs/{run_id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["status"] == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("run {run_id} never reached status {want}");
}
