use sqlx::Row;

use leadline_core::domain::pipeline::{PipelineId, PipelineStage, StageId};

use super::{decode_err, RepositoryError, StageRepository};
use crate::DbPool;

const STAGE_COLUMNS: &str = "id, pipeline_id, name, position, is_input, webhook_url";

pub struct SqlStageRepository {
    pool: DbPool,
}

impl SqlStageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_stage(row: &sqlx::sqlite::SqliteRow) -> Result<PipelineStage, RepositoryError> {
    Ok(PipelineStage {
        id: StageId(row.try_get("id").map_err(decode_err)?),
        pipeline_id: PipelineId(row.try_get("pipeline_id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        position: row.try_get("position").map_err(decode_err)?,
        is_input: row.try_get::<i64, _>("is_input").map_err(decode_err)? != 0,
        webhook_url: row.try_get("webhook_url").map_err(decode_err)?,
    })
}

#[async_trait::async_trait]
impl StageRepository for SqlStageRepository {
    async fn find_input_stage(
        &self,
        pipeline_id: &PipelineId,
    ) -> Result<Option<PipelineStage>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {STAGE_COLUMNS} FROM pipeline_stage
             WHERE pipeline_id = ? AND is_input = 1
             ORDER BY position ASC
             LIMIT 1"
        ))
        .bind(&pipeline_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_stage).transpose()
    }

    async fn find_by_id(&self, id: &StageId) -> Result<Option<PipelineStage>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {STAGE_COLUMNS} FROM pipeline_stage WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_stage).transpose()
    }

    async fn list_previous(
        &self,
        pipeline_id: &PipelineId,
        position: i64,
    ) -> Result<Vec<PipelineStage>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STAGE_COLUMNS} FROM pipeline_stage
             WHERE pipeline_id = ? AND position < ?
             ORDER BY position DESC"
        ))
        .bind(&pipeline_id.0)
        .bind(position)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_stage).collect()
    }

    async fn list_next(
        &self,
        pipeline_id: &PipelineId,
        position: i64,
    ) -> Result<Vec<PipelineStage>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STAGE_COLUMNS} FROM pipeline_stage
             WHERE pipeline_id = ? AND position > ?
             ORDER BY position ASC"
        ))
        .bind(&pipeline_id.0)
        .bind(position)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_stage).collect()
    }
}

#[cfg(test)]
mod tests {
    use leadline_core::domain::pipeline::{PipelineId, StageId};

    use super::SqlStageRepository;
    use crate::fixtures::{DemoSeedDataset, DEMO_INPUT_STAGE_ID, DEMO_PIPELINE_ID};
    use crate::repositories::StageRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlStageRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeedDataset::load(&pool).await.expect("seed");
        SqlStageRepository::new(pool)
    }

    fn pipeline() -> PipelineId {
        PipelineId(DEMO_PIPELINE_ID.to_string())
    }

    #[tokio::test]
    async fn input_stage_is_resolved_per_pipeline() {
        let repo = setup().await;

        let stage = repo.find_input_stage(&pipeline()).await.expect("query").expect("input stage");

        assert_eq!(stage.id, StageId(DEMO_INPUT_STAGE_ID.to_string()));
        assert!(stage.is_input);
        assert_eq!(stage.position, 1);
    }

    #[tokio::test]
    async fn neighbors_are_ordered_around_position() {
        let repo = setup().await;

        let previous = repo.list_previous(&pipeline(), 2).await.expect("previous");
        let next = repo.list_next(&pipeline(), 2).await.expect("next");

        let previous: Vec<i64> = previous.iter().map(|stage| stage.position).collect();
        let next: Vec<i64> = next.iter().map(|stage| stage.position).collect();
        assert_eq!(previous, vec![1]);
        assert_eq!(next, vec![3, 4]);
    }

    #[tokio::test]
    async fn previous_stages_are_descending() {
        let repo = setup().await;

        let previous = repo.list_previous(&pipeline(), 4).await.expect("previous");

        let positions: Vec<i64> = previous.iter().map(|stage| stage.position).collect();
        assert_eq!(positions, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn stage_lookup_by_id() {
        let repo = setup().await;

        let found = repo.find_by_id(&StageId("stage-demo-won".to_string())).await.expect("query");
        let missing = repo.find_by_id(&StageId("stage-missing".to_string())).await.expect("query");

        assert_eq!(found.map(|stage| stage.name), Some("Won".to_string()));
        assert!(missing.is_none());
    }
}
