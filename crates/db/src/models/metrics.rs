use accelbench_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `benchmark_metrics` table.
///
/// Exactly one per run; immutable once written. Every measurement column is
/// nullable — `None` means the value was never observed, which is distinct
/// from zero.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BenchmarkMetrics {
    pub id: Uuid,
    pub run_id: Uuid,
    pub ttft_p50_ms: Option<f64>,
    pub ttft_p90_ms: Option<f64>,
    pub ttft_p95_ms: Option<f64>,
    pub ttft_p99_ms: Option<f64>,
    pub e2e_latency_p50_ms: Option<f64>,
    pub e2e_latency_p90_ms: Option<f64>,
    pub e2e_latency_p95_ms: Option<f64>,
    pub e2e_latency_p99_ms: Option<f64>,
    pub itl_p50_ms: Option<f64>,
    pub itl_p90_ms: Option<f64>,
    pub itl_p95_ms: Option<f64>,
    pub itl_p99_ms: Option<f64>,
    pub throughput_per_request_tps: Option<f64>,
    pub throughput_aggregate_tps: Option<f64>,
    pub requests_per_second: Option<f64>,
    pub accelerator_utilization_pct: Option<f64>,
    pub accelerator_utilization_avg_pct: Option<f64>,
    pub accelerator_memory_peak_gib: Option<f64>,
    pub waiting_requests_max: Option<i64>,
    pub successful_requests: Option<i64>,
    pub failed_requests: Option<i64>,
    pub total_duration_seconds: Option<f64>,
    pub created_at: Timestamp,
}
