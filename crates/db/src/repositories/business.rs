use sqlx::Row;

use leadline_core::domain::business::{Business, BusinessId};

use super::{decode_err, BusinessRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBusinessRepository {
    pool: DbPool,
}

impl SqlBusinessRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BusinessRepository for SqlBusinessRepository {
    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, timezone FROM business WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Business {
            id: BusinessId(row.try_get("id").map_err(decode_err)?),
            name: row.try_get("name").map_err(decode_err)?,
            timezone: row.try_get("timezone").map_err(decode_err)?,
        }))
    }
}
