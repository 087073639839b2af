use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::Row;

use leadline_core::domain::connection::OAuthConnection;
use leadline_core::domain::EmployeeId;

use super::{decode_err, parse_timestamp, OAuthConnectionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOAuthConnectionRepository {
    pool: DbPool,
}

impl SqlOAuthConnectionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OAuthConnectionRepository for SqlOAuthConnectionRepository {
    async fn find_for_employee(
        &self,
        employee_id: &EmployeeId,
        provider: &str,
    ) -> Result<Option<OAuthConnection>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, employee_id, provider, access_token, refresh_token, expires_at
             FROM oauth_connection
             WHERE employee_id = ? AND provider = ?",
        )
        .bind(&employee_id.0)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let access_token: String = row.try_get("access_token").map_err(decode_err)?;
        let refresh_token: Option<String> = row.try_get("refresh_token").map_err(decode_err)?;
        let expires_at: Option<String> = row.try_get("expires_at").map_err(decode_err)?;

        Ok(Some(OAuthConnection {
            id: row.try_get("id").map_err(decode_err)?,
            employee_id: EmployeeId(row.try_get("employee_id").map_err(decode_err)?),
            provider: row.try_get("provider").map_err(decode_err)?,
            access_token: access_token.into(),
            refresh_token: refresh_token.map(SecretString::from),
            expires_at: expires_at
                .as_deref()
                .map(|raw| parse_timestamp("expires_at", raw))
                .transpose()?,
        }))
    }

    async fn update_tokens(
        &self,
        connection_id: &str,
        access_token: &SecretString,
        refresh_token: Option<&SecretString>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        // A refresh grant may omit the refresh token; keep the stored one in that case.
        sqlx::query(
            "UPDATE oauth_connection
             SET access_token = ?,
                 refresh_token = COALESCE(?, refresh_token),
                 expires_at = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(access_token.expose_secret())
        .bind(refresh_token.map(|token| token.expose_secret()))
        .bind(expires_at.map(|at| at.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .bind(connection_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use secrecy::{ExposeSecret, SecretString};

    use leadline_core::domain::connection::GOOGLE_CALENDAR_PROVIDER;
    use leadline_core::domain::EmployeeId;

    use super::SqlOAuthConnectionRepository;
    use crate::fixtures::{DemoSeedDataset, DEMO_EMPLOYEE_ID};
    use crate::repositories::OAuthConnectionRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlOAuthConnectionRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeedDataset::load(&pool).await.expect("seed");
        SqlOAuthConnectionRepository::new(pool)
    }

    #[tokio::test]
    async fn rotated_tokens_are_persisted() {
        let repo = setup().await;
        let employee = EmployeeId(DEMO_EMPLOYEE_ID.to_string());
        let connection = repo
            .find_for_employee(&employee, GOOGLE_CALENDAR_PROVIDER)
            .await
            .expect("query")
            .expect("connection exists");

        let expires_at = Utc::now() + Duration::hours(1);
        let rotated = SecretString::from("ya29.rotated".to_string());
        repo.update_tokens(&connection.id, &rotated, None, Some(expires_at))
            .await
            .expect("update tokens");

        let reloaded = repo
            .find_for_employee(&employee, GOOGLE_CALENDAR_PROVIDER)
            .await
            .expect("query")
            .expect("connection exists");
        assert_eq!(reloaded.access_token.expose_secret(), "ya29.rotated");
        assert_eq!(
            reloaded.refresh_token.as_ref().map(|token| token.expose_secret().to_string()),
            Some("demo-refresh-token".to_string()),
            "refresh token is kept when the grant omits it",
        );
        assert_eq!(reloaded.expires_at.map(|at| at.timestamp()), Some(expires_at.timestamp()));
    }

    #[tokio::test]
    async fn unknown_provider_has_no_connection() {
        let repo = setup().await;

        let found = repo
            .find_for_employee(&EmployeeId(DEMO_EMPLOYEE_ID.to_string()), "outlook")
            .await
            .expect("query");

        assert!(found.is_none());
    }
}
