//! Handlers for the `/runs` and `/jobs` resources.
//!
//! Run creation replies as soon as the row is inserted; the orchestration
//! task is spawned detached from the request so closing the HTTP response
//! never cancels the run.

use accelbench_core::error::CoreError;
use accelbench_db::models::run::{NewBenchmarkRun, RunFilter, RunRequest};
use accelbench_db::models::status::RunStatus;
use accelbench_db::repositories::{InstanceTypeRepo, MetricsRepo, ModelRepo, RunRepo};
use accelbench_orchestrator::RunConfig;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Reject malformed run requests before touching the database.
fn validate(request: &RunRequest) -> Result<(), AppError> {
    let mut problems = Vec::new();

    if request.model_hf_id.is_empty() {
        problems.push("model_hf_id is required");
    }
    if request.instance_type_name.is_empty() {
        problems.push("instance_type_name is required");
    }
    if !matches!(request.framework.as_str(), "vllm" | "vllm-neuron") {
        problems.push("framework must be \"vllm\" or \"vllm-neuron\"");
    }
    if request.framework_version.is_empty() {
        problems.push("framework_version is required");
    }
    if request.tensor_parallel_degree < 1 {
        problems.push("tensor_parallel_degree must be at least 1");
    }
    if request.concurrency < 1 {
        problems.push("concurrency must be at least 1");
    }
    if request.input_sequence_length < 1 || request.output_sequence_length < 1 {
        problems.push("sequence lengths must be at least 1");
    }
    if request.dataset_name.is_empty() {
        problems.push("dataset_name is required");
    }
    if !matches!(request.run_type.as_str(), "catalog" | "on_demand") {
        problems.push("run_type must be \"catalog\" or \"on_demand\"");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::BadRequest(problems.join("; ")))
    }
}

/// POST /api/v1/runs
///
/// Create a benchmark run and start orchestrating it in the background.
/// Replies 202 with `{id, status: "pending"}` immediately after the
/// insert; 404 when the instance type is unknown (no run row is created).
pub async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> AppResult<impl IntoResponse> {
    validate(&request)?;

    // Instance types are seeded; an unknown name is the caller's mistake.
    let instance_type = InstanceTypeRepo::find_by_name(&state.pool, &request.instance_type_name)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::not_found(
                "instance type",
                &request.instance_type_name,
            ))
        })?;

    // Models register lazily on first reference.
    let model = ModelRepo::ensure(
        &state.pool,
        &request.model_hf_id,
        &request.model_hf_revision,
    )
    .await?;

    let run = RunRepo::create(
        &state.pool,
        &NewBenchmarkRun {
            model_id: model.id,
            instance_type_id: instance_type.id,
            framework: request.framework.clone(),
            framework_version: request.framework_version.clone(),
            tensor_parallel_degree: request.tensor_parallel_degree,
            quantization: request.quantization.clone(),
            concurrency: request.concurrency,
            input_sequence_length: request.input_sequence_length,
            output_sequence_length: request.output_sequence_length,
            dataset_name: request.dataset_name.clone(),
            run_type: request.run_type.clone(),
        },
    )
    .await?;

    tracing::info!(
        run_id = %run.id,
        model = %request.model_hf_id,
        instance = %request.instance_type_name,
        "Benchmark run created",
    );

    // Detach the orchestration from the request: the response ending must
    // not cancel the run.
    let orchestrator = state.orchestrator.clone();
    let cfg = RunConfig {
        run_id: run.id,
        model,
        instance_type,
        request,
    };
    tokio::spawn(async move {
        if let Err(err) = orchestrator.execute(cfg).await {
            tracing::error!(error = %err, "Benchmark run failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": run.id, "status": "pending" })),
    ))
}

/// GET /api/v1/runs/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let run = RunRepo::find_by_id(&state.pool, run_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("run", run_id)))?;
    Ok(Json(run))
}

/// GET /api/v1/runs/{id}/metrics
///
/// 404 until the run has completed and its metrics are durable.
pub async fn get_run_metrics(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let metrics = MetricsRepo::find_by_run_id(&state.pool, run_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("metrics for run", run_id)))?;
    Ok(Json(metrics))
}

/// GET /api/v1/jobs
///
/// List runs, newest first. Supports `status`, `model` (substring),
/// `limit`, and `offset`.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(filter): Query<RunFilter>,
) -> AppResult<impl IntoResponse> {
    let items = RunRepo::list(&state.pool, &filter).await?;
    Ok(Json(items))
}

/// POST /api/v1/runs/{id}/cancel
///
/// Cancel an active run: 409 unless the run is pending or running. The
/// orchestrator's deferred teardown cleans up cluster resources.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let run = RunRepo::find_by_id(&state.pool, run_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("run", run_id)))?;

    if !run.status.is_active() {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "cannot cancel run with status {}",
            run.status
        ))));
    }

    state.orchestrator.cancel_run(run_id);
    RunRepo::update_status(&state.pool, run_id, RunStatus::Failed).await?;

    tracing::info!(run_id = %run_id, "Benchmark run cancelled");

    Ok(Json(json!({ "id": run_id, "status": "failed" })))
}

/// DELETE /api/v1/runs/{id}
///
/// Cancel the run if it is still active, then delete the row and its
/// metrics. 204 on success.
pub async fn delete_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let run = RunRepo::find_by_id(&state.pool, run_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("run", run_id)))?;

    if run.status.is_active() {
        state.orchestrator.cancel_run(run_id);
        let _ = RunRepo::update_status(&state.pool, run_id, RunStatus::Failed).await;
    }

    RunRepo::delete(&state.pool, run_id).await?;

    tracing::info!(run_id = %run_id, "Benchmark run deleted");

    Ok(StatusCode::NO_CONTENT)
}
