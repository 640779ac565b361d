use accelbench_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `models` table.
///
/// Identity is the `(hf_id, hf_revision)` pair; rows are created lazily on
/// first reference and never deleted while referenced by a run.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Model {
    pub id: Uuid,
    pub hf_id: String,
    pub hf_revision: String,
    pub model_family: Option<String>,
    pub parameter_count: Option<i64>,
    pub created_at: Timestamp,
}
