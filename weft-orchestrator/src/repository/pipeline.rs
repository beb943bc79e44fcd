//! Pipeline Repository
//!
//! Stores pipeline templates as a JSONB spec keyed by unique name.

use async_trait::async_trait;
use sqlx::PgPool;
use weft_core::domain::Pipeline;
use weft_engine::{PipelineRepository, RepositoryError};

#[derive(Debug, Clone)]
pub struct PgPipelineRepository {
    pool: PgPool,
}

impl PgPipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRepository for PgPipelineRepository {
    async fn create(&self, pipeline: &Pipeline) -> Result<(), RepositoryError> {
        let now = chrono::Utc::now();
        sqlx::query(
            r#"
            INSERT INTO pipelines (name, spec, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&pipeline.name)
        .bind(serde_json::to_value(&pipeline.spec)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::backend)?;

        Ok(())
    }

    async fn update(&self, pipeline: &Pipeline) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET spec = $1, updated_at = $2
            WHERE name = $3
            "#,
        )
        .bind(serde_json::to_value(&pipeline.spec)?)
        .bind(chrono::Utc::now())
        .bind(&pipeline.name)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Pipeline>, RepositoryError> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT name, spec
            FROM pipelines
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::backend)?;

        row.map(Pipeline::try_from).transpose()
    }

    async fn save(&self, pipeline: &Pipeline) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>(UPSERT_PIPELINE)
            .bind(&pipeline.name)
            .bind(serde_json::to_value(&pipeline.spec)?)
            .bind(chrono::Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::backend)
    }
}

// A fresh row has no deleting transaction id, so `xmax = 0` marks an insert.
const UPSERT_PIPELINE: &str = r#"
    INSERT INTO pipelines (name, spec, created_at, updated_at)
    VALUES ($1, $2, $3, $3)
    ON CONFLICT (name) DO UPDATE
    SET spec = EXCLUDED.spec, updated_at = EXCLUDED.updated_at
    RETURNING (xmax = 0) AS inserted
"#;

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    name: String,
    spec: serde_json::Value,
}

impl TryFrom<PipelineRow> for Pipeline {
    type Error = RepositoryError;

    fn try_from(row: PipelineRow) -> Result<Self, Self::Error> {
        Ok(Pipeline {
            name: row.name,
            spec: serde_json::from_value(row.spec)?,
        })
    }
}
