use axum::routing::get;
use axum::Router;

use crate::handlers::pricing;
use crate::state::AppState;

/// Routes mounted at `/pricing`.
pub fn router() -> Router<AppState> {
    Router::new().route("/pricing", get(pricing::list_pricing))
}
