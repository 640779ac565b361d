use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `instance_types` table.
///
/// Seeded by migration; effectively immutable.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InstanceType {
    pub id: Uuid,
    pub name: String,
    pub family: String,
    /// `"gpu"` or `"neuron"`.
    pub accelerator_type: String,
    pub accelerator_name: String,
    pub accelerator_count: i32,
    pub accelerator_memory_gib: i32,
    pub vcpus: i32,
    pub memory_gib: i32,
}
