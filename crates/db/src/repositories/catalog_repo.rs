//! The catalog projection query.
//!
//! Callers never join `benchmark_runs` against models, instance types, and
//! metrics themselves; this repository is the one read path, and it always
//! restricts to completed, non-superseded runs.

use sqlx::PgPool;

use crate::models::catalog::{sort_column, CatalogEntry, CatalogFilter};

/// Maximum page size for catalog queries.
const MAX_LIMIT: i64 = 500;

/// Default page size for catalog queries.
const DEFAULT_LIMIT: i64 = 100;

/// Read access to the denormalized catalog view.
pub struct CatalogRepo;

impl CatalogRepo {
    /// Query the catalog with optional filters, sorting, and pagination.
    pub async fn list(
        pool: &PgPool,
        filter: &CatalogFilter,
    ) -> Result<Vec<CatalogEntry>, sqlx::Error> {
        let mut conditions = vec![
            "br.status = 'completed'".to_string(),
            "br.superseded = FALSE".to_string(),
        ];
        let mut bind_idx: u32 = 0;

        let mut text_filters: Vec<&str> = Vec::new();
        for (value, column) in [
            (filter.model.as_deref(), "m.hf_id"),
            (filter.model_family.as_deref(), "m.model_family"),
            (filter.instance_family.as_deref(), "it.family"),
            (filter.accelerator_type.as_deref(), "it.accelerator_type"),
        ] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                bind_idx += 1;
                conditions.push(format!("{column} = ${bind_idx}"));
                text_filters.push(value);
            }
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        // Sorting: whitelisted keys only; nulls always sort last.
        let order_by = match filter.sort.as_deref().and_then(sort_column) {
            Some(column) => {
                let dir = if filter.order.as_deref() == Some("desc") {
                    "DESC"
                } else {
                    "ASC"
                };
                format!("ORDER BY {column} {dir} NULLS LAST")
            }
            None => "ORDER BY m.hf_id, it.name".to_string(),
        };

        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = filter.offset.unwrap_or(0).max(0);

        let query = format!(
            "SELECT \
                 br.id AS run_id, m.hf_id AS model_hf_id, m.model_family, m.parameter_count, \
                 it.name AS instance_type_name, it.family AS instance_family, \
                 it.accelerator_type, it.accelerator_name, \
                 it.accelerator_count, it.accelerator_memory_gib, \
                 br.framework, br.framework_version, br.tensor_parallel_degree, \
                 br.quantization, br.concurrency, \
                 br.input_sequence_length, br.output_sequence_length, \
                 br.completed_at, \
                 bm.ttft_p50_ms, bm.ttft_p99_ms, \
                 bm.e2e_latency_p50_ms, bm.e2e_latency_p99_ms, \
                 bm.itl_p50_ms, bm.itl_p99_ms, \
                 bm.throughput_per_request_tps, bm.throughput_aggregate_tps, \
                 bm.requests_per_second, \
                 bm.accelerator_utilization_pct, bm.accelerator_memory_peak_gib \
             FROM benchmark_runs br \
             JOIN models m ON br.model_id = m.id \
             JOIN instance_types it ON br.instance_type_id = it.id \
             JOIN benchmark_metrics bm ON bm.run_id = br.id \
             {where_clause} \
             {order_by} \
             LIMIT ${} OFFSET ${}",
            bind_idx + 1,
            bind_idx + 2,
        );

        let mut q = sqlx::query_as::<_, CatalogEntry>(&query);
        for value in text_filters {
            q = q.bind(value.to_string());
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }
}
