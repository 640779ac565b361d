//! Repository for the `models` table.

use sqlx::PgPool;

use crate::models::model::Model;

/// Column list for `models` queries.
const COLUMNS: &str = "id, hf_id, hf_revision, model_family, parameter_count, created_at";

/// Provides lookup and lazy registration of models.
pub struct ModelRepo;

impl ModelRepo {
    /// Find a model by its HuggingFace id and revision.
    pub async fn find_by_hf_id(
        pool: &PgPool,
        hf_id: &str,
        hf_revision: &str,
    ) -> Result<Option<Model>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM models WHERE hf_id = $1 AND hf_revision = $2");
        sqlx::query_as::<_, Model>(&query)
            .bind(hf_id)
            .bind(hf_revision)
            .fetch_optional(pool)
            .await
    }

    /// Return the existing model or create it on first reference.
    ///
    /// Safe under concurrent creation: the upsert always returns a row.
    pub async fn ensure(
        pool: &PgPool,
        hf_id: &str,
        hf_revision: &str,
    ) -> Result<Model, sqlx::Error> {
        let query = format!(
            "INSERT INTO models (hf_id, hf_revision) \
             VALUES ($1, $2) \
             ON CONFLICT (hf_id, hf_revision) DO UPDATE SET hf_id = EXCLUDED.hf_id \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Model>(&query)
            .bind(hf_id)
            .bind(hf_revision)
            .fetch_one(pool)
            .await
    }
}
