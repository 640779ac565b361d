//! End-to-end lifecycle tests against the in-memory mock cluster.
//!
//! Each test drives `Orchestrator::execute` with a real (migrated) database
//! and asserts on the three contracts that matter: terminal status,
//! metrics presence, and teardown totality.

use std::sync::Arc;
use std::time::Duration;

use accelbench_cluster::mock::MockCluster;
use accelbench_cluster::{ClusterApi, JobState};
use accelbench_core::metrics::{LoadgenOutput, RequestResult, Summary};
use accelbench_db::models::run::{NewBenchmarkRun, RunRequest};
use accelbench_db::models::status::RunStatus;
use accelbench_db::repositories::{InstanceTypeRepo, MetricsRepo, ModelRepo, RunRepo};
use accelbench_orchestrator::{Orchestrator, OrchestratorConfig, ResourceNames, RunConfig};
use sqlx::PgPool;

/// Production config with poll intervals shrunk for tests.
fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        readiness_timeout: Duration::from_secs(5),
        readiness_poll: Duration::from_millis(10),
        job_timeout: Duration::from_secs(5),
        job_poll: Duration::from_millis(10),
        ..OrchestratorConfig::default()
    }
}

/// Seed a pending run on g5.xlarge and build its RunConfig.
async fn seed_run(pool: &PgPool) -> RunConfig {
    let model = ModelRepo::ensure(pool, "meta-llama/Llama-3.1-8B", "abc123")
        .await
        .unwrap();
    let instance_type = InstanceTypeRepo::find_by_name(pool, "g5.xlarge")
        .await
        .unwrap()
        .unwrap();

    let run = RunRepo::create(
        pool,
        &NewBenchmarkRun {
            model_id: model.id,
            instance_type_id: instance_type.id,
            framework: "vllm".into(),
            framework_version: "v0.6.0".into(),
            tensor_parallel_degree: 1,
            quantization: None,
            concurrency: 16,
            input_sequence_length: 512,
            output_sequence_length: 256,
            dataset_name: "sharegpt".into(),
            run_type: "on_demand".into(),
        },
    )
    .await
    .unwrap();

    RunConfig {
        run_id: run.id,
        request: RunRequest {
            model_hf_id: model.hf_id.clone(),
            model_hf_revision: model.hf_revision.clone(),
            instance_type_name: instance_type.name.clone(),
            framework: "vllm".into(),
            framework_version: "v0.6.0".into(),
            tensor_parallel_degree: 1,
            quantization: None,
            concurrency: 16,
            input_sequence_length: 512,
            output_sequence_length: 256,
            dataset_name: "sharegpt".into(),
            run_type: "on_demand".into(),
            max_model_len: 0,
            min_duration_seconds: 60,
            hf_token: String::new(),
        },
        model,
        instance_type,
    }
}

/// A loadgen log stream: progress noise around a marker-delimited payload
/// whose successful TTFTs are [10, 20, 30].
fn loadgen_log() -> Vec<u8> {
    let request = |ttft: f64, tokens: i64| RequestResult {
        ttft_ms: ttft,
        e2e_latency_ms: ttft * 10.0,
        itl_ms: ttft / 2.0,
        input_tokens: 512,
        output_tokens: tokens,
        duration_seconds: 1.5,
        success: true,
    };
    let output = LoadgenOutput {
        requests: vec![request(10.0, 50), request(20.0, 100), request(30.0, 75)],
        summary: Summary {
            total_duration_seconds: 12.5,
            total_requests: 3,
            successful_requests: 3,
            failed_requests: 0,
            throughput_aggregate_tps: 18.0,
            requests_per_second: 0.24,
            ..Summary::default()
        },
    };
    format!(
        "warmup 10/10 done\nprogress: 200/200\nACCELBENCH_JSON_BEGIN\n{}\nACCELBENCH_JSON_END\n",
        serde_json::to_string(&output).unwrap()
    )
    .into_bytes()
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn happy_path_completes_and_tears_down(pool: PgPool) {
    let cluster = Arc::new(MockCluster::new());
    cluster.auto_ready_deployments();
    cluster.complete_jobs_on_create(JobState::Complete);

    let cfg = seed_run(&pool).await;
    let names = ResourceNames::for_run(cfg.run_id);
    cluster.set_job_logs(&names.loadgen, loadgen_log());

    let orchestrator = Orchestrator::new(pool.clone(), cluster.clone(), test_config());
    orchestrator.execute(cfg.clone()).await.unwrap();

    let run = RunRepo::find_by_id(&pool, cfg.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.started_at.is_some());
    assert!(run.completed_at.is_some());

    let metrics = MetricsRepo::find_by_run_id(&pool, cfg.run_id)
        .await
        .unwrap()
        .expect("completed run must have metrics");
    assert_eq!(metrics.ttft_p50_ms, Some(20.0));
    assert_eq!(metrics.ttft_p99_ms, Some(30.0));
    assert_eq!(metrics.successful_requests, Some(3));

    // Teardown totality: nothing the run created is left.
    assert_eq!(cluster.resource_count(), 0);
}

// ---------------------------------------------------------------------------
// Parse failure
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn parse_failure_fails_run_without_metrics(pool: PgPool) {
    let cluster = Arc::new(MockCluster::new());
    cluster.auto_ready_deployments();
    cluster.complete_jobs_on_create(JobState::Complete);

    let cfg = seed_run(&pool).await;
    let names = ResourceNames::for_run(cfg.run_id);
    cluster.set_job_logs(&names.loadgen, "progress 1/200\nprogress 2/200\nno json here\n");

    let orchestrator = Orchestrator::new(pool.clone(), cluster.clone(), test_config());
    let err = orchestrator.execute(cfg.clone()).await.unwrap_err();
    assert!(err.to_string().contains("no valid JSON payload"));

    let run = RunRepo::find_by_id(&pool, cfg.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.completed_at.is_some());
    assert!(MetricsRepo::find_by_run_id(&pool, cfg.run_id)
        .await
        .unwrap()
        .is_none());

    // Teardown still removed the deployment and job.
    assert_eq!(cluster.resource_count(), 0);
}

// ---------------------------------------------------------------------------
// Loadgen job failure
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn failed_job_surfaces_condition_message(pool: PgPool) {
    let cluster = Arc::new(MockCluster::new());
    cluster.auto_ready_deployments();
    cluster.complete_jobs_on_create(JobState::Failed {
        message: "OOM killed".into(),
    });

    let cfg = seed_run(&pool).await;
    let orchestrator = Orchestrator::new(pool.clone(), cluster.clone(), test_config());
    let err = orchestrator.execute(cfg.clone()).await.unwrap_err();
    assert!(err.to_string().contains("loadgen job failed: OOM killed"));

    let run = RunRepo::find_by_id(&pool, cfg.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(cluster.resource_count(), 0);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn cancel_during_readiness_wait_fails_and_cleans_up(pool: PgPool) {
    // No auto-ready: execute blocks polling the deployment.
    let cluster = Arc::new(MockCluster::new());

    let cfg = seed_run(&pool).await;
    let run_id = cfg.run_id;
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        cluster.clone(),
        OrchestratorConfig {
            readiness_timeout: Duration::from_secs(60),
            readiness_poll: Duration::from_millis(10),
            ..test_config()
        },
    ));

    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.execute(cfg).await })
    };

    // Let the run reach the readiness wait, then cancel.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(orchestrator.cancel_run(run_id));

    let outcome = task.await.unwrap();
    assert!(outcome.is_err());

    let run = RunRepo::find_by_id(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(cluster.resource_count(), 0);

    // After the run exited, cancelling again is a no-op.
    assert!(!orchestrator.cancel_run(run_id));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn cancel_is_idempotent_while_running(pool: PgPool) {
    let cluster = Arc::new(MockCluster::new());

    let cfg = seed_run(&pool).await;
    let run_id = cfg.run_id;
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        cluster.clone(),
        OrchestratorConfig {
            readiness_timeout: Duration::from_secs(60),
            readiness_poll: Duration::from_millis(10),
            ..test_config()
        },
    ));

    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.execute(cfg).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Two sequential cancels behave as one.
    assert!(orchestrator.cancel_run(run_id));
    orchestrator.cancel_run(run_id);

    assert!(task.await.unwrap().is_err());
    let run = RunRepo::find_by_id(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn cancel_unknown_run_is_a_no_op(pool: PgPool) {
    let cluster = Arc::new(MockCluster::new());
    let orchestrator = Orchestrator::new(pool, cluster, test_config());
    assert!(!orchestrator.cancel_run(uuid::Uuid::new_v4()));
}

// ---------------------------------------------------------------------------
// Resource collisions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn preexisting_resources_are_a_hard_error(pool: PgPool) {
    let cluster = Arc::new(MockCluster::new());

    let cfg = seed_run(&pool).await;
    let names = ResourceNames::for_run(cfg.run_id);

    // Leak a deployment under the run's derived name.
    cluster
        .apply_manifest(&format!(
            "kind: Deployment\nmetadata:\n  name: {}\n",
            names.model
        ))
        .await
        .unwrap();

    let orchestrator = Orchestrator::new(pool.clone(), cluster.clone(), test_config());
    let err = orchestrator.execute(cfg.clone()).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));

    let run = RunRepo::find_by_id(&pool, cfg.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}
