use axum::routing::get;
use axum::Router;

use crate::handlers::recommend;
use crate::state::AppState;

/// Routes mounted at `/recommend`.
pub fn router() -> Router<AppState> {
    Router::new().route("/recommend", get(recommend::recommend))
}
