//! Repository for the `benchmark_runs` table.
//!
//! Status transitions are monotone: updates refuse to leave a terminal
//! state, and the side timestamps (`started_at`, `completed_at`) are set by
//! the transition itself.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::run::{BenchmarkRun, NewBenchmarkRun, RunFilter, RunListItem};
use crate::models::status::RunStatus;

/// Column list for `benchmark_runs` queries.
const COLUMNS: &str = "\
    id, model_id, instance_type_id, framework, framework_version, \
    tensor_parallel_degree, quantization, concurrency, \
    input_sequence_length, output_sequence_length, dataset_name, \
    run_type, status, superseded, started_at, completed_at, created_at";

/// Maximum page size for the run list.
const MAX_LIMIT: i64 = 200;

/// Default page size for the run list.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD operations for benchmark runs.
pub struct RunRepo;

impl RunRepo {
    /// Insert a new run in `pending` status and return the full row.
    pub async fn create(
        pool: &PgPool,
        input: &NewBenchmarkRun,
    ) -> Result<BenchmarkRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO benchmark_runs \
                 (model_id, instance_type_id, framework, framework_version, \
                  tensor_parallel_degree, quantization, concurrency, \
                  input_sequence_length, output_sequence_length, dataset_name, \
                  run_type, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BenchmarkRun>(&query)
            .bind(input.model_id)
            .bind(input.instance_type_id)
            .bind(&input.framework)
            .bind(&input.framework_version)
            .bind(input.tensor_parallel_degree)
            .bind(&input.quantization)
            .bind(input.concurrency)
            .bind(input.input_sequence_length)
            .bind(input.output_sequence_length)
            .bind(&input.dataset_name)
            .bind(&input.run_type)
            .fetch_one(pool)
            .await
    }

    /// Transition a run's status, side-setting `started_at` on entry to
    /// `running` and `completed_at` on entry to a terminal state.
    ///
    /// A run already in a terminal state is left untouched; returns whether
    /// a row was updated.
    pub async fn update_status(
        pool: &PgPool,
        run_id: Uuid,
        status: RunStatus,
    ) -> Result<bool, sqlx::Error> {
        let set_clause = match status {
            RunStatus::Running => "status = $2, started_at = NOW()",
            RunStatus::Completed | RunStatus::Failed => "status = $2, completed_at = NOW()",
            RunStatus::Pending => "status = $2",
        };
        let query = format!(
            "UPDATE benchmark_runs SET {set_clause} \
             WHERE id = $1 AND status NOT IN ('completed', 'failed')"
        );
        let result = sqlx::query(&query)
            .bind(run_id)
            .bind(status)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark an older run as superseded so the catalog hides it.
    pub async fn mark_superseded(pool: &PgPool, run_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE benchmark_runs SET superseded = TRUE WHERE id = $1")
            .bind(run_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a run by its id.
    pub async fn find_by_id(pool: &PgPool, run_id: Uuid) -> Result<Option<BenchmarkRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM benchmark_runs WHERE id = $1");
        sqlx::query_as::<_, BenchmarkRun>(&query)
            .bind(run_id)
            .fetch_optional(pool)
            .await
    }

    /// List runs matching the filter, newest first, joined with model and
    /// instance type names for display.
    pub async fn list(pool: &PgPool, filter: &RunFilter) -> Result<Vec<RunListItem>, sqlx::Error> {
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = filter.offset.unwrap_or(0).max(0);

        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if filter.status.is_some() {
            conditions.push(format!("br.status = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.model.as_deref().is_some_and(|m| !m.is_empty()) {
            conditions.push(format!("m.hf_id ILIKE ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT br.id, m.hf_id AS model_hf_id, it.name AS instance_type_name, \
                    br.framework, br.run_type, br.status, \
                    br.created_at, br.started_at, br.completed_at \
             FROM benchmark_runs br \
             JOIN models m ON br.model_id = m.id \
             JOIN instance_types it ON br.instance_type_id = it.id \
             {where_clause} \
             ORDER BY br.created_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, RunListItem>(&query);
        if let Some(status) = filter.status {
            q = q.bind(status);
        }
        if let Some(model) = filter.model.as_deref().filter(|m| !m.is_empty()) {
            q = q.bind(format!("%{model}%"));
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Delete a run and its metrics in one transaction.
    ///
    /// Returns whether the run existed.
    pub async fn delete(pool: &PgPool, run_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM benchmark_metrics WHERE run_id = $1")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM benchmark_runs WHERE id = $1")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
