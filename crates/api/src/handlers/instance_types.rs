//! Handlers for the seeded instance-type listing.

use accelbench_db::repositories::InstanceTypeRepo;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /api/v1/instance-types
pub async fn list_instance_types(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let types = InstanceTypeRepo::list(&state.pool).await?;
    Ok(Json(types))
}
