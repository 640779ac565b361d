//! Handlers for the catalog projection.

use accelbench_db::models::catalog::CatalogFilter;
use accelbench_db::repositories::CatalogRepo;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /api/v1/catalog
///
/// Query the catalog: completed, non-superseded runs joined with their
/// model, instance type, and metrics. Supports exact filters, whitelisted
/// sort keys (`order=desc` for descending), and pagination capped at 500.
pub async fn list_catalog(
    State(state): State<AppState>,
    Query(filter): Query<CatalogFilter>,
) -> AppResult<impl IntoResponse> {
    let entries = CatalogRepo::list(&state.pool, &filter).await?;
    Ok(Json(entries))
}
