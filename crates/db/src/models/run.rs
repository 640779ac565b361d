//! Benchmark run entity and its request/filter DTOs.

use accelbench_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::RunStatus;

/// A row from the `benchmark_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BenchmarkRun {
    pub id: Uuid,
    pub model_id: Uuid,
    pub instance_type_id: Uuid,
    pub framework: String,
    pub framework_version: String,
    pub tensor_parallel_degree: i32,
    pub quantization: Option<String>,
    pub concurrency: i32,
    pub input_sequence_length: i32,
    pub output_sequence_length: i32,
    pub dataset_name: String,
    /// `"catalog"` or `"on_demand"`; descriptive only.
    pub run_type: String,
    pub status: RunStatus,
    pub superseded: bool,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Insert payload for a new benchmark run (always starts `pending`).
#[derive(Debug, Clone)]
pub struct NewBenchmarkRun {
    pub model_id: Uuid,
    pub instance_type_id: Uuid,
    pub framework: String,
    pub framework_version: String,
    pub tensor_parallel_degree: i32,
    pub quantization: Option<String>,
    pub concurrency: i32,
    pub input_sequence_length: i32,
    pub output_sequence_length: i32,
    pub dataset_name: String,
    pub run_type: String,
}

/// The run request accepted by `POST /api/v1/runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub model_hf_id: String,
    #[serde(default)]
    pub model_hf_revision: String,
    pub instance_type_name: String,
    pub framework: String,
    pub framework_version: String,
    #[serde(default = "default_tensor_parallel")]
    pub tensor_parallel_degree: i32,
    #[serde(default)]
    pub quantization: Option<String>,
    pub concurrency: i32,
    pub input_sequence_length: i32,
    pub output_sequence_length: i32,
    pub dataset_name: String,
    #[serde(default = "default_run_type")]
    pub run_type: String,
    /// 0 = model default context length.
    #[serde(default)]
    pub max_model_len: i32,
    /// Minimum benchmark duration enforced by the load generator.
    #[serde(default)]
    pub min_duration_seconds: i32,
    /// HuggingFace token for gated models; never persisted.
    #[serde(default)]
    pub hf_token: String,
}

fn default_tensor_parallel() -> i32 {
    1
}

fn default_run_type() -> String {
    "on_demand".to_string()
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunFilter {
    /// Filter by lifecycle status.
    pub status: Option<RunStatus>,
    /// Case-insensitive substring match on the model hf_id.
    pub model: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 200.
    pub limit: Option<i64>,
    /// Number of results to skip.
    pub offset: Option<i64>,
}

/// A denormalized row for the run list, joined with display names.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunListItem {
    pub id: Uuid,
    pub model_hf_id: String,
    pub instance_type_name: String,
    pub framework: String,
    pub run_type: String,
    pub status: RunStatus,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}
