use accelbench_core::types::Timestamp;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `pricing` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Pricing {
    pub id: Uuid,
    pub instance_type_id: Uuid,
    pub region: String,
    pub on_demand_hourly_usd: f64,
    pub reserved_1yr_hourly_usd: Option<f64>,
    pub reserved_3yr_hourly_usd: Option<f64>,
    pub effective_date: NaiveDate,
    pub created_at: Timestamp,
}

/// Upsert payload, keyed by `(instance_type_id, region, effective_date)`.
#[derive(Debug, Clone)]
pub struct UpsertPricing {
    pub instance_type_id: Uuid,
    pub region: String,
    pub on_demand_hourly_usd: f64,
    pub reserved_1yr_hourly_usd: Option<f64>,
    pub reserved_3yr_hourly_usd: Option<f64>,
    pub effective_date: NaiveDate,
}

/// A denormalized pricing row for API display, joined with the instance
/// type name. Only the most recent effective date per instance is listed.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PricingRow {
    pub instance_type_name: String,
    pub on_demand_hourly_usd: f64,
    pub reserved_1yr_hourly_usd: Option<f64>,
    pub reserved_3yr_hourly_usd: Option<f64>,
    pub effective_date: NaiveDate,
}
