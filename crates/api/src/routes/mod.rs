pub mod catalog;
pub mod health;
pub mod instance_types;
pub mod pricing;
pub mod recommend;
pub mod runs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /catalog                 catalog projection query
/// /runs                    create run
/// /runs/{id}               run record
/// /runs/{id}/metrics       persisted metrics
/// /runs/{id}/cancel        cancel an active run
/// /jobs                    run listing
/// /instance-types          seeded instance types
/// /pricing                 current pricing per region
/// /recommend               configuration recommendation
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(catalog::router())
        .merge(runs::router())
        .merge(instance_types::router())
        .merge(pricing::router())
        .merge(recommend::router())
}
