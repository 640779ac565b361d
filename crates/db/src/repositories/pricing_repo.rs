//! Repository for the `pricing` table.

use sqlx::PgPool;

use crate::models::pricing::{PricingRow, UpsertPricing};

/// Idempotent storage of hourly instance prices.
pub struct PricingRepo;

impl PricingRepo {
    /// Insert or update a pricing row keyed by
    /// `(instance_type_id, region, effective_date)`.
    pub async fn upsert(pool: &PgPool, input: &UpsertPricing) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO pricing \
                 (instance_type_id, region, on_demand_hourly_usd, \
                  reserved_1yr_hourly_usd, reserved_3yr_hourly_usd, effective_date) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (instance_type_id, region, effective_date) DO UPDATE SET \
                 on_demand_hourly_usd    = EXCLUDED.on_demand_hourly_usd, \
                 reserved_1yr_hourly_usd = EXCLUDED.reserved_1yr_hourly_usd, \
                 reserved_3yr_hourly_usd = EXCLUDED.reserved_3yr_hourly_usd",
        )
        .bind(input.instance_type_id)
        .bind(&input.region)
        .bind(input.on_demand_hourly_usd)
        .bind(input.reserved_1yr_hourly_usd)
        .bind(input.reserved_3yr_hourly_usd)
        .bind(input.effective_date)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// List the most recent pricing row per instance type in a region,
    /// joined with the instance type name.
    pub async fn list_by_region(
        pool: &PgPool,
        region: &str,
    ) -> Result<Vec<PricingRow>, sqlx::Error> {
        sqlx::query_as::<_, PricingRow>(
            "SELECT it.name AS instance_type_name, p.on_demand_hourly_usd, \
                    p.reserved_1yr_hourly_usd, p.reserved_3yr_hourly_usd, p.effective_date \
             FROM pricing p \
             JOIN instance_types it ON it.id = p.instance_type_id \
             WHERE p.region = $1 \
               AND p.effective_date = ( \
                   SELECT MAX(p2.effective_date) \
                   FROM pricing p2 \
                   WHERE p2.instance_type_id = p.instance_type_id AND p2.region = p.region \
               ) \
             ORDER BY it.name",
        )
        .bind(region)
        .fetch_all(pool)
        .await
    }
}
