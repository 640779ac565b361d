//! Handlers for pricing queries.

use accelbench_db::repositories::PricingRepo;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::state::AppState;

/// Default region for pricing queries.
const DEFAULT_REGION: &str = "us-east-2";

/// Query parameters for `GET /api/v1/pricing`.
#[derive(Debug, Deserialize)]
pub struct PricingQuery {
    pub region: Option<String>,
}

/// GET /api/v1/pricing?region=...
///
/// Current (most recent effective date) pricing rows for the region.
pub async fn list_pricing(
    State(state): State<AppState>,
    Query(query): Query<PricingQuery>,
) -> AppResult<impl IntoResponse> {
    let region = query.region.as_deref().unwrap_or(DEFAULT_REGION);
    let rows = PricingRepo::list_by_region(&state.pool, region).await?;
    Ok(Json(rows))
}
