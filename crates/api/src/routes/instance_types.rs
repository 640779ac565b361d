use axum::routing::get;
use axum::Router;

use crate::handlers::instance_types;
use crate::state::AppState;

/// Routes mounted at `/instance-types`.
pub fn router() -> Router<AppState> {
    Router::new().route("/instance-types", get(instance_types::list_instance_types))
}
