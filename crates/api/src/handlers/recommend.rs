//! Handler for benchmark-configuration recommendations.

use accelbench_core::error::CoreError;
use accelbench_core::recommend::{self, InstanceSpec};
use accelbench_core::types::is_neuron;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Query parameters for `GET /api/v1/recommend`.
#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    pub model: Option<String>,
    pub instance_type: Option<String>,
}

/// GET /api/v1/recommend?model=...&instance_type=...
///
/// Fetch model metadata from HuggingFace and compute a deterministic
/// configuration recommendation for the instance. Neuron instances are
/// declined; the recommender considers GPU instances only.
pub async fn recommend(
    State(state): State<AppState>,
    Query(query): Query<RecommendQuery>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let model_id = query
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::BadRequest("model query parameter is required".into()))?;
    let instance_name = query
        .instance_type
        .as_deref()
        .filter(|i| !i.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("instance_type query parameter is required".into())
        })?;

    let hf_token = headers
        .get("x-hf-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let instance_type =
        accelbench_db::repositories::InstanceTypeRepo::find_by_name(&state.pool, instance_name)
            .await?
            .ok_or_else(|| {
                AppError::Core(CoreError::not_found("instance type", instance_name))
            })?;

    if is_neuron(&instance_type.accelerator_type) {
        return Ok(Json(recommend::neuron_unsupported()));
    }

    let model_config = state
        .hf
        .fetch_model_config(model_id, hf_token)
        .await
        .map_err(|err| AppError::Upstream {
            status: StatusCode::from_u16(err.status).unwrap_or(StatusCode::BAD_GATEWAY),
            message: err.message,
        })?;

    // Every GPU instance is a candidate for the "try a larger instance"
    // alternative.
    let all_specs: Vec<InstanceSpec> =
        accelbench_db::repositories::InstanceTypeRepo::list(&state.pool)
            .await?
            .into_iter()
            .map(|it| InstanceSpec {
                name: it.name,
                accelerator_type: it.accelerator_type,
                accelerator_name: it.accelerator_name,
                accelerator_count: it.accelerator_count as i64,
                accelerator_memory_gib: it.accelerator_memory_gib as i64,
            })
            .collect();

    let spec = InstanceSpec {
        name: instance_type.name.clone(),
        accelerator_type: instance_type.accelerator_type.clone(),
        accelerator_name: instance_type.accelerator_name.clone(),
        accelerator_count: instance_type.accelerator_count as i64,
        accelerator_memory_gib: instance_type.accelerator_memory_gib as i64,
    };

    Ok(Json(recommend::recommend(&model_config, &spec, &all_specs)))
}
