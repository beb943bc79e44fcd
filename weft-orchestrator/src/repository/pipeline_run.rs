//! Pipeline Run Repository
//!
//! One row per run: the frozen pipeline, spec and status as JSONB documents
//! plus a plain `state` column indexed for recovery queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use weft_core::domain::{PipelineRun, RunState};
use weft_engine::{PipelineRunRepository, RepositoryError};

#[derive(Debug, Clone)]
pub struct PgPipelineRunRepository {
    pool: PgPool,
}

impl PgPipelineRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRunRepository for PgPipelineRunRepository {
    async fn create(&self, mut run: PipelineRun) -> Result<PipelineRun, RepositoryError> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pipeline_runs (pipeline, spec, status, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(serde_json::to_value(&run.pipeline)?)
        .bind(serde_json::to_value(&run.spec)?)
        .bind(serde_json::to_value(&run.status)?)
        .bind(run.state.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::backend)?;

        run.id = id;
        run.created_at = now;
        run.updated_at = now;
        Ok(run)
    }

    async fn update(&self, run: &PipelineRun) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET spec = $1, status = $2, state = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(serde_json::to_value(&run.spec)?)
        .bind(serde_json::to_value(&run.status)?)
        .bind(run.state.as_str())
        .bind(Utc::now())
        .bind(run.id)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: i64) -> Result<Option<PipelineRun>, RepositoryError> {
        let row = sqlx::query_as::<_, PipelineRunRow>(
            r#"
            SELECT id, pipeline, spec, status, state, created_at, updated_at
            FROM pipeline_runs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::backend)?;

        row.map(PipelineRun::try_from).transpose()
    }

    async fn list_running(&self) -> Result<Vec<i64>, RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM pipeline_runs WHERE state = $1 ORDER BY id")
            .bind(RunState::Running.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::backend)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRunRow {
    id: i64,
    pipeline: serde_json::Value,
    spec: serde_json::Value,
    status: serde_json::Value,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PipelineRunRow> for PipelineRun {
    type Error = RepositoryError;

    fn try_from(row: PipelineRunRow) -> Result<Self, Self::Error> {
        // Unknown state strings are treated as still running so recovery
        // picks the run up instead of losing it.
        let state = RunState::parse(&row.state).unwrap_or_default();
        Ok(PipelineRun {
            id: row.id,
            pipeline: serde_json::from_value(row.pipeline)?,
            spec: serde_json::from_value(row.spec)?,
            status: serde_json::from_value(row.status)?,
            state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::domain::pipeline::KeyAndValue;
    use weft_core::domain::{Node, NodeStatusSpec, Pipeline};

    fn row_of(run: &PipelineRun, state: &str) -> PipelineRunRow {
        PipelineRunRow {
            id: 7,
            pipeline: serde_json::to_value(&run.pipeline).unwrap(),
            spec: serde_json::to_value(&run.spec).unwrap(),
            status: serde_json::to_value(&run.status).unwrap(),
            state: state.to_string(),
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }

    #[test]
    fn test_row_roundtrips_snapshot() {
        let mut run = PipelineRun::new(
            Pipeline::new("leave").with_node(Node::new("approve", "examine")),
            vec![KeyAndValue::new("days", "3")],
        );
        run.id = 7;
        run.state = RunState::Kill;
        run.status.status = RunState::Kill;
        run.status.node_run.push(NodeStatusSpec::open("approve"));

        let decoded = PipelineRun::try_from(row_of(&run, "Kill")).unwrap();
        assert_eq!(decoded, run);
    }

    #[test]
    fn test_unknown_state_reads_as_running() {
        let run = PipelineRun::new(Pipeline::new("leave"), Vec::new());
        let decoded = PipelineRun::try_from(row_of(&run, "Archived")).unwrap();
        assert_eq!(decoded.state, RunState::Running);
    }
}
