//! Integration tests for run creation, status transitions, metric
//! persistence, and deletion.

use accelbench_core::metrics::ComputedMetrics;
use accelbench_db::models::run::{NewBenchmarkRun, RunFilter};
use accelbench_db::models::status::RunStatus;
use accelbench_db::repositories::{InstanceTypeRepo, MetricsRepo, ModelRepo, RunRepo};
use sqlx::PgPool;
use uuid::Uuid;

/// Create a pending run for a freshly-ensured model on a seeded instance.
async fn seed_run(pool: &PgPool, hf_id: &str) -> Uuid {
    let model = ModelRepo::ensure(pool, hf_id, "abc123").await.unwrap();
    let instance = InstanceTypeRepo::find_by_name(pool, "g5.xlarge")
        .await
        .unwrap()
        .expect("g5.xlarge is seeded by migration");

    let run = RunRepo::create(
        pool,
        &NewBenchmarkRun {
            model_id: model.id,
            instance_type_id: instance.id,
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

    assert_eq!(run.status, RunStatus::Pending);
    assert!(run.started_at.is_none());
    run.id
}

fn sample_metrics() -> ComputedMetrics {
    ComputedMetrics {
        ttft_p50_ms: Some(20.0),
        ttft_p99_ms: Some(30.0),
        successful_requests: Some(3),
        failed_requests: Some(1),
        total_duration_seconds: Some(10.0),
        ..ComputedMetrics::default()
    }
}

// ---------------------------------------------------------------------------
// Model upsert
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn ensure_model_is_idempotent(pool: PgPool) {
    let first = ModelRepo::ensure(&pool, "meta-llama/Llama-3.1-8B", "abc123")
        .await
        .unwrap();
    let second = ModelRepo::ensure(&pool, "meta-llama/Llama-3.1-8B", "abc123")
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    // A different revision is a different model.
    let other = ModelRepo::ensure(&pool, "meta-llama/Llama-3.1-8B", "def456")
        .await
        .unwrap();
    assert_ne!(first.id, other.id);
}

// ---------------------------------------------------------------------------
// Status transitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn running_sets_started_at(pool: PgPool) {
    let run_id = seed_run(&pool, "meta-llama/Llama-3.1-8B").await;

    assert!(RunRepo::update_status(&pool, run_id, RunStatus::Running)
        .await
        .unwrap());

    let run = RunRepo::find_by_id(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.started_at.is_some());
    assert!(run.completed_at.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_sets_completed_at(pool: PgPool) {
    let run_id = seed_run(&pool, "meta-llama/Llama-3.1-8B").await;

    RunRepo::update_status(&pool, run_id, RunStatus::Running)
        .await
        .unwrap();
    RunRepo::update_status(&pool, run_id, RunStatus::Failed)
        .await
        .unwrap();

    let run = RunRepo::find_by_id(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.completed_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn terminal_status_never_regresses(pool: PgPool) {
    let run_id = seed_run(&pool, "meta-llama/Llama-3.1-8B").await;

    RunRepo::update_status(&pool, run_id, RunStatus::Failed)
        .await
        .unwrap();

    // A late "mark running" from a slow task must not resurrect the run.
    let updated = RunRepo::update_status(&pool, run_id, RunStatus::Running)
        .await
        .unwrap();
    assert!(!updated);

    let run = RunRepo::find_by_id(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

// ---------------------------------------------------------------------------
// Metric persistence
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn persist_metrics_completes_the_run_atomically(pool: PgPool) {
    let run_id = seed_run(&pool, "meta-llama/Llama-3.1-8B").await;
    RunRepo::update_status(&pool, run_id, RunStatus::Running)
        .await
        .unwrap();

    MetricsRepo::persist(&pool, run_id, &sample_metrics())
        .await
        .unwrap();

    let run = RunRepo::find_by_id(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at.is_some());

    let metrics = MetricsRepo::find_by_run_id(&pool, run_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metrics.run_id, run_id);
    assert_eq!(metrics.ttft_p50_ms, Some(20.0));
    // Absent percentiles stay absent, not zero.
    assert_eq!(metrics.itl_p50_ms, None);
}

#[sqlx::test(migrations = "./migrations")]
async fn persist_metrics_twice_fails(pool: PgPool) {
    let run_id = seed_run(&pool, "meta-llama/Llama-3.1-8B").await;
    RunRepo::update_status(&pool, run_id, RunStatus::Running)
        .await
        .unwrap();

    MetricsRepo::persist(&pool, run_id, &sample_metrics())
        .await
        .unwrap();
    let err = MetricsRepo::persist(&pool, run_id, &sample_metrics()).await;
    assert!(err.is_err(), "second persist must hit the unique run_id");
}

#[sqlx::test(migrations = "./migrations")]
async fn metrics_absent_until_persisted(pool: PgPool) {
    let run_id = seed_run(&pool, "meta-llama/Llama-3.1-8B").await;
    assert!(MetricsRepo::find_by_run_id(&pool, run_id)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn list_filters_by_status_and_model_substring(pool: PgPool) {
    let a = seed_run(&pool, "meta-llama/Llama-3.1-8B").await;
    let b = seed_run(&pool, "mistralai/Mistral-7B").await;
    RunRepo::update_status(&pool, b, RunStatus::Failed)
        .await
        .unwrap();

    let pending = RunRepo::list(
        &pool,
        &RunFilter {
            status: Some(RunStatus::Pending),
            ..RunFilter::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, a);

    let mistral = RunRepo::list(
        &pool,
        &RunFilter {
            model: Some("mistral".into()),
            ..RunFilter::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(mistral.len(), 1);
    assert_eq!(mistral[0].id, b);
    assert_eq!(mistral[0].instance_type_name, "g5.xlarge");
}

#[sqlx::test(migrations = "./migrations")]
async fn list_is_newest_first(pool: PgPool) {
    let first = seed_run(&pool, "meta-llama/Llama-3.1-8B").await;
    let second = seed_run(&pool, "meta-llama/Llama-3.1-70B").await;

    let items = RunRepo::list(&pool, &RunFilter::default()).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, second);
    assert_eq!(items[1].id, first);
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn delete_removes_run_and_metrics(pool: PgPool) {
    let run_id = seed_run(&pool, "meta-llama/Llama-3.1-8B").await;
    RunRepo::update_status(&pool, run_id, RunStatus::Running)
        .await
        .unwrap();
    MetricsRepo::persist(&pool, run_id, &sample_metrics())
        .await
        .unwrap();

    assert!(RunRepo::delete(&pool, run_id).await.unwrap());
    assert!(RunRepo::find_by_id(&pool, run_id).await.unwrap().is_none());
    assert!(MetricsRepo::find_by_run_id(&pool, run_id)
        .await
        .unwrap()
        .is_none());

    // Deleting again reports absence.
    assert!(!RunRepo::delete(&pool, run_id).await.unwrap());
}
