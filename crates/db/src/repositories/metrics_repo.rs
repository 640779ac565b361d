//! Repository for the `benchmark_metrics` table.
//!
//! Metrics are immutable: the only write path is [`MetricsRepo::persist`],
//! which inserts the row, verifies it by read-back, and flips the run to
//! `completed` in a single transaction. There is deliberately no update
//! operation.

use accelbench_core::metrics::ComputedMetrics;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::metrics::BenchmarkMetrics;

/// Column list for `benchmark_metrics` queries.
const COLUMNS: &str = "\
    id, run_id, \
    ttft_p50_ms, ttft_p90_ms, ttft_p95_ms, ttft_p99_ms, \
    e2e_latency_p50_ms, e2e_latency_p90_ms, e2e_latency_p95_ms, e2e_latency_p99_ms, \
    itl_p50_ms, itl_p90_ms, itl_p95_ms, itl_p99_ms, \
    throughput_per_request_tps, throughput_aggregate_tps, requests_per_second, \
    accelerator_utilization_pct, accelerator_utilization_avg_pct, \
    accelerator_memory_peak_gib, waiting_requests_max, \
    successful_requests, failed_requests, total_duration_seconds, created_at";

/// Write-once storage for computed benchmark metrics.
pub struct MetricsRepo;

impl MetricsRepo {
    /// Atomically persist metrics for a run and mark it completed.
    ///
    /// Within one transaction: INSERT the metrics row, read it back and
    /// verify it points at the expected run, then UPDATE the run to
    /// `completed` with `completed_at = NOW()`. Rolls back if the run
    /// already has metrics (unique `run_id`), the read-back mismatches, or
    /// the run is no longer active — a run is never marked completed
    /// without durable metrics, and no metrics row outlives a terminal
    /// run it did not complete.
    pub async fn persist(
        pool: &PgPool,
        run_id: Uuid,
        metrics: &ComputedMetrics,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let metrics_id: Uuid = sqlx::query_scalar(
            "INSERT INTO benchmark_metrics \
                 (run_id, \
                  ttft_p50_ms, ttft_p90_ms, ttft_p95_ms, ttft_p99_ms, \
                  e2e_latency_p50_ms, e2e_latency_p90_ms, e2e_latency_p95_ms, e2e_latency_p99_ms, \
                  itl_p50_ms, itl_p90_ms, itl_p95_ms, itl_p99_ms, \
                  throughput_per_request_tps, throughput_aggregate_tps, requests_per_second, \
                  accelerator_utilization_pct, accelerator_utilization_avg_pct, \
                  accelerator_memory_peak_gib, waiting_requests_max, \
                  successful_requests, failed_requests, total_duration_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                     $14, $15, $16, $17, $18, $19, $20, $21, $22, $23) \
             RETURNING id",
        )
        .bind(run_id)
        .bind(metrics.ttft_p50_ms)
        .bind(metrics.ttft_p90_ms)
        .bind(metrics.ttft_p95_ms)
        .bind(metrics.ttft_p99_ms)
        .bind(metrics.e2e_latency_p50_ms)
        .bind(metrics.e2e_latency_p90_ms)
        .bind(metrics.e2e_latency_p95_ms)
        .bind(metrics.e2e_latency_p99_ms)
        .bind(metrics.itl_p50_ms)
        .bind(metrics.itl_p90_ms)
        .bind(metrics.itl_p95_ms)
        .bind(metrics.itl_p99_ms)
        .bind(metrics.throughput_per_request_tps)
        .bind(metrics.throughput_aggregate_tps)
        .bind(metrics.requests_per_second)
        .bind(metrics.accelerator_utilization_pct)
        .bind(metrics.accelerator_utilization_avg_pct)
        .bind(metrics.accelerator_memory_peak_gib)
        .bind(metrics.waiting_requests_max)
        .bind(metrics.successful_requests)
        .bind(metrics.failed_requests)
        .bind(metrics.total_duration_seconds)
        .fetch_one(&mut *tx)
        .await?;

        // Read-back verification before committing.
        let verify_run_id: Uuid =
            sqlx::query_scalar("SELECT run_id FROM benchmark_metrics WHERE id = $1")
                .bind(metrics_id)
                .fetch_one(&mut *tx)
                .await?;
        if verify_run_id != run_id {
            return Err(sqlx::Error::Protocol(format!(
                "metrics verification failed: expected run_id {run_id}, got {verify_run_id}"
            )));
        }

        let updated = sqlx::query(
            "UPDATE benchmark_runs \
             SET status = 'completed', completed_at = NOW() \
             WHERE id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            // The run vanished or was already terminal (e.g. cancelled
            // moments ago). Roll back so no metrics row outlives it.
            return Err(sqlx::Error::Protocol(format!(
                "run {run_id} is not in an active state; metrics not persisted"
            )));
        }

        tx.commit().await
    }

    /// Fetch the metrics row for a run, if one has been persisted.
    pub async fn find_by_run_id(
        pool: &PgPool,
        run_id: Uuid,
    ) -> Result<Option<BenchmarkMetrics>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM benchmark_metrics WHERE run_id = $1");
        sqlx::query_as::<_, BenchmarkMetrics>(&query)
            .bind(run_id)
            .fetch_optional(pool)
            .await
    }
}
