use sqlx::Row;

use leadline_core::domain::business::BusinessId;
use leadline_core::domain::pipeline::{Pipeline, PipelineId};

use super::{decode_err, PipelineRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPipelineRepository {
    pool: DbPool,
}

impl SqlPipelineRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_pipeline(row: &sqlx::sqlite::SqliteRow) -> Result<Pipeline, RepositoryError> {
    Ok(Pipeline {
        id: PipelineId(row.try_get("id").map_err(decode_err)?),
        business_id: BusinessId(row.try_get("business_id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        whatsapp_phone_number_id: row.try_get("whatsapp_phone_number_id").map_err(decode_err)?,
        whatsapp_enabled: row.try_get::<i64, _>("whatsapp_enabled").map_err(decode_err)? != 0,
    })
}

#[async_trait::async_trait]
impl PipelineRepository for SqlPipelineRepository {
    async fn find_enabled_by_channel(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<Pipeline>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, business_id, name, whatsapp_phone_number_id, whatsapp_enabled
             FROM pipeline
             WHERE whatsapp_enabled = 1 AND whatsapp_phone_number_id = ?
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(phone_number_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_pipeline).transpose()
    }

    async fn find_by_id(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, business_id, name, whatsapp_phone_number_id, whatsapp_enabled
             FROM pipeline WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_pipeline).transpose()
    }
}
