//! Repository for the seeded `instance_types` table.

use sqlx::PgPool;

use crate::models::instance_type::InstanceType;

/// Column list for `instance_types` queries.
const COLUMNS: &str = "\
    id, name, family, accelerator_type, accelerator_name, \
    accelerator_count, accelerator_memory_gib, vcpus, memory_gib";

/// Read access to instance types (the table is seeded and immutable).
pub struct InstanceTypeRepo;

impl InstanceTypeRepo {
    /// Find an instance type by its unique name.
    pub async fn find_by_name(
        pool: &PgPool,
        name: &str,
    ) -> Result<Option<InstanceType>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM instance_types WHERE name = $1");
        sqlx::query_as::<_, InstanceType>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// List all instance types, ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<InstanceType>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM instance_types ORDER BY name");
        sqlx::query_as::<_, InstanceType>(&query).fetch_all(pool).await
    }
}
