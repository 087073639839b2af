use sqlx::Row;

use leadline_core::api_keys::ApiKeyEntry;

use super::{decode_err, ApiKeyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApiKeyRepository {
    pool: DbPool,
}

impl SqlApiKeyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ApiKeyRepository for SqlApiKeyRepository {
    async fn list_active(&self) -> Result<Vec<ApiKeyEntry>, RepositoryError> {
        let rows = sqlx::query("SELECT key, user_id, label FROM api_key WHERE active = 1")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ApiKeyEntry {
                    key: row.try_get("key").map_err(decode_err)?,
                    user_id: row.try_get("user_id").map_err(decode_err)?,
                    label: row.try_get("label").map_err(decode_err)?,
                })
            })
            .collect()
    }
}
