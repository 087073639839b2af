use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tracing::info;

use leadline_calendar::GoogleCalendarClient;
use leadline_core::api_keys::ApiKeyCache;
use leadline_core::config::{AppConfig, ConfigError, LoadOptions};
use leadline_db::{connect_with_settings, migrations, DbPool, RecordStore, RepositoryError};
use leadline_whatsapp::{client_from_config, MessagingError};

use crate::auth::refresh_api_key_cache;
use crate::routes;
use crate::state::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

impl Application {
    pub fn router(&self) -> Router {
        routes::router(self.state.clone(), &self.config.webhooks, self.db_pool.clone())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("messaging client setup failed: {0}")]
    Messaging(#[from] MessagingError),
    #[error("http client setup failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("api key cache initialization failed: {0}")]
    ApiKeys(#[source] RepositoryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store = RecordStore::sql(db_pool.clone());
    let messaging = client_from_config(&config.whatsapp)?;
    if config.whatsapp.access_token.is_none() {
        info!(
            event_name = "system.bootstrap.messaging_disabled",
            correlation_id = "bootstrap",
            "no WhatsApp access token configured; messaging calls will fail"
        );
    }
    let calendar = Arc::new(GoogleCalendarClient::from_config(&config.calendar));

    let api_keys = Arc::new(ApiKeyCache::new());
    let key_count =
        refresh_api_key_cache(&store, &api_keys).await.map_err(BootstrapError::ApiKeys)?;
    info!(
        event_name = "system.bootstrap.api_keys_loaded",
        correlation_id = "bootstrap",
        keys = key_count,
        "api key cache initialized"
    );

    let state = AppState::from_parts(&config, store, messaging, calendar, api_keys)?;
    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use leadline_core::config::{ConfigOverrides, LoadOptions};
    use leadline_db::DemoSeedDataset;

    use crate::auth::refresh_api_key_cache;
    use crate::bootstrap::bootstrap;

    fn in_memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_starts_with_empty_key_cache() {
        let app = bootstrap(in_memory_options()).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('pipeline', 'pipeline_stage', 'lead', 'api_key')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 4);
        assert!(app.state.api_keys.is_empty());

        DemoSeedDataset::load(&app.db_pool).await.expect("seed");
        let count = refresh_api_key_cache(&app.state.store, &app.state.api_keys)
            .await
            .expect("refresh");
        assert_eq!(count, 1);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn invalid_configuration_fails_fast() {
        let mut options = in_memory_options();
        options.overrides.port = Some(0);

        let error = bootstrap(options).await.err().expect("bootstrap should fail");

        assert!(error.to_string().contains("port"));
    }
}
