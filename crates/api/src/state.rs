use std::sync::Arc;

use accelbench_orchestrator::Orchestrator;

use crate::config::ServerConfig;
use crate::hf::HfClient;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable: inner data is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: accelbench_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The run lifecycle engine; owns the cancellation registry.
    pub orchestrator: Arc<Orchestrator>,
    /// HuggingFace metadata client for the recommender.
    pub hf: Arc<HfClient>,
}
