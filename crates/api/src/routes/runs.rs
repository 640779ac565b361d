//! Route definitions for runs and the jobs listing.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/runs` and `/jobs`.
///
/// ```text
/// POST   /runs                 -> create_run
/// GET    /runs/{id}            -> get_run
/// DELETE /runs/{id}            -> delete_run
/// GET    /runs/{id}/metrics    -> get_run_metrics
/// POST   /runs/{id}/cancel     -> cancel_run
/// GET    /jobs                 -> list_runs
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/runs", post(runs::create_run))
        .route("/runs/{id}", get(runs::get_run).delete(runs::delete_run))
        .route("/runs/{id}/metrics", get(runs::get_run_metrics))
        .route("/runs/{id}/cancel", post(runs::cancel_run))
        .route("/jobs", get(runs::list_runs))
}
