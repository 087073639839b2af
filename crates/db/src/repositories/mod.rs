use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;

use leadline_core::api_keys::ApiKeyEntry;
use leadline_core::domain::business::{Business, BusinessId};
use leadline_core::domain::connection::OAuthConnection;
use leadline_core::domain::lead::{Lead, LeadId};
use leadline_core::domain::pipeline::{Pipeline, PipelineId, PipelineStage, StageId};
use leadline_core::domain::EmployeeId;
use leadline_core::errors::FlowError;

use crate::DbPool;

pub mod api_key;
pub mod business;
pub mod connection;
pub mod lead;
pub mod memory;
pub mod pipeline;
pub mod stage;

pub use api_key::SqlApiKeyRepository;
pub use business::SqlBusinessRepository;
pub use connection::SqlOAuthConnectionRepository;
pub use lead::SqlLeadRepository;
pub use memory::InMemoryCrmStore;
pub use pipeline::SqlPipelineRepository;
pub use stage::SqlStageRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for FlowError {
    fn from(error: RepositoryError) -> Self {
        FlowError::upstream(format!("record store failure: {error}"))
    }
}

pub(crate) fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Only pipelines with the channel enabled match, whatever the stored channel id.
    async fn find_enabled_by_channel(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<Pipeline>, RepositoryError>;

    async fn find_by_id(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError>;
}

#[async_trait]
pub trait StageRepository: Send + Sync {
    async fn find_input_stage(
        &self,
        pipeline_id: &PipelineId,
    ) -> Result<Option<PipelineStage>, RepositoryError>;

    async fn find_by_id(&self, id: &StageId) -> Result<Option<PipelineStage>, RepositoryError>;

    /// Stages before `position`, nearest first.
    async fn list_previous(
        &self,
        pipeline_id: &PipelineId,
        position: i64,
    ) -> Result<Vec<PipelineStage>, RepositoryError>;

    /// Stages after `position`, in pipeline order.
    async fn list_next(
        &self,
        pipeline_id: &PipelineId,
        position: i64,
    ) -> Result<Vec<PipelineStage>, RepositoryError>;
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn count_open_by_phone(&self, phone_number: &str) -> Result<i64, RepositoryError>;

    async fn find_open_by_phone(&self, phone_number: &str) -> Result<Option<Lead>, RepositoryError>;

    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;

    /// Fails with [`RepositoryError::Conflict`] when another open lead holds the phone number.
    async fn insert(&self, lead: Lead) -> Result<(), RepositoryError>;

    /// Returns whether a row was updated.
    async fn update_stage(
        &self,
        id: &LeadId,
        stage_id: &StageId,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait BusinessRepository: Send + Sync {
    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError>;
}

#[async_trait]
pub trait OAuthConnectionRepository: Send + Sync {
    async fn find_for_employee(
        &self,
        employee_id: &EmployeeId,
        provider: &str,
    ) -> Result<Option<OAuthConnection>, RepositoryError>;

    async fn update_tokens(
        &self,
        connection_id: &str,
        access_token: &SecretString,
        refresh_token: Option<&SecretString>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<ApiKeyEntry>, RepositoryError>;
}

/// Shared handles to every repository the orchestration layer reads or writes.
#[derive(Clone)]
pub struct RecordStore {
    pub pipelines: Arc<dyn PipelineRepository>,
    pub stages: Arc<dyn StageRepository>,
    pub leads: Arc<dyn LeadRepository>,
    pub businesses: Arc<dyn BusinessRepository>,
    pub connections: Arc<dyn OAuthConnectionRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
}

impl RecordStore {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            pipelines: Arc::new(SqlPipelineRepository::new(pool.clone())),
            stages: Arc::new(SqlStageRepository::new(pool.clone())),
            leads: Arc::new(SqlLeadRepository::new(pool.clone())),
            businesses: Arc::new(SqlBusinessRepository::new(pool.clone())),
            connections: Arc::new(SqlOAuthConnectionRepository::new(pool.clone())),
            api_keys: Arc::new(SqlApiKeyRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryCrmStore>) -> Self {
        Self {
            pipelines: store.clone(),
            stages: store.clone(),
            leads: store.clone(),
            businesses: store.clone(),
            connections: store.clone(),
            api_keys: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use leadline_core::errors::{ErrorClass, FlowError};

    use super::RepositoryError;

    #[test]
    fn repository_errors_surface_as_upstream_failures() {
        let error: FlowError = RepositoryError::Decode("bad timestamp".to_string()).into();

        assert_eq!(error.class(), ErrorClass::Upstream);
        assert!(error.to_string().contains("bad timestamp"));
    }
}
