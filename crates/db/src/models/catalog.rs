//! The catalog projection: a read-path join over completed, non-superseded
//! runs with their model, instance type, and metrics.

use accelbench_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One catalog row, keyed by run id.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CatalogEntry {
    pub run_id: Uuid,
    pub model_hf_id: String,
    pub model_family: Option<String>,
    pub parameter_count: Option<i64>,
    pub instance_type_name: String,
    pub instance_family: String,
    pub accelerator_type: String,
    pub accelerator_name: String,
    pub accelerator_count: i32,
    pub accelerator_memory_gib: i32,
    pub framework: String,
    pub framework_version: String,
    pub tensor_parallel_degree: i32,
    pub quantization: Option<String>,
    pub concurrency: i32,
    pub input_sequence_length: i32,
    pub output_sequence_length: i32,
    pub completed_at: Option<Timestamp>,

    // Inlined from benchmark_metrics.
    pub ttft_p50_ms: Option<f64>,
    pub ttft_p99_ms: Option<f64>,
    pub e2e_latency_p50_ms: Option<f64>,
    pub e2e_latency_p99_ms: Option<f64>,
    pub itl_p50_ms: Option<f64>,
    pub itl_p99_ms: Option<f64>,
    pub throughput_per_request_tps: Option<f64>,
    pub throughput_aggregate_tps: Option<f64>,
    pub requests_per_second: Option<f64>,
    pub accelerator_utilization_pct: Option<f64>,
    pub accelerator_memory_peak_gib: Option<f64>,
}

/// Query parameters for `GET /api/v1/catalog`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFilter {
    /// Exact match on model hf_id.
    pub model: Option<String>,
    /// Exact match on model family.
    pub model_family: Option<String>,
    /// Exact match on instance family (e.g. `"p5"`).
    pub instance_family: Option<String>,
    /// `"gpu"` or `"neuron"`.
    pub accelerator_type: Option<String>,
    /// Whitelisted sort key; see [`sort_column`].
    pub sort: Option<String>,
    /// `"desc"` for descending order.
    pub order: Option<String>,
    /// Maximum number of results. Defaults to 100, capped at 500.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Map a user-facing sort key to a SQL column expression.
///
/// Returns `None` for unknown keys, which fall back to the default
/// `(model, instance)` ordering — sort keys are never interpolated from
/// user input directly.
pub fn sort_column(key: &str) -> Option<&'static str> {
    Some(match key {
        "model" => "m.hf_id",
        "instance" => "it.name",
        "ttft_p50" => "bm.ttft_p50_ms",
        "ttft_p99" => "bm.ttft_p99_ms",
        "e2e_latency_p50" => "bm.e2e_latency_p50_ms",
        "e2e_latency_p99" => "bm.e2e_latency_p99_ms",
        "itl_p50" => "bm.itl_p50_ms",
        "itl_p99" => "bm.itl_p99_ms",
        "throughput_per_request" => "bm.throughput_per_request_tps",
        "throughput_aggregate" => "bm.throughput_aggregate_tps",
        "requests_per_second" => "bm.requests_per_second",
        "accelerator_utilization" => "bm.accelerator_utilization_pct",
        "accelerator_memory_peak" => "bm.accelerator_memory_peak_gib",
        "completed_at" => "br.completed_at",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_whitelist_rejects_unknown_keys() {
        assert_eq!(sort_column("ttft_p50"), Some("bm.ttft_p50_ms"));
        assert_eq!(sort_column("completed_at"), Some("br.completed_at"));
        assert_eq!(sort_column("id; DROP TABLE models"), None);
        assert_eq!(sort_column(""), None);
    }
}
