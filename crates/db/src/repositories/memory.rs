use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::RwLock;

use leadline_core::api_keys::ApiKeyEntry;
use leadline_core::domain::business::{Business, BusinessId};
use leadline_core::domain::connection::OAuthConnection;
use leadline_core::domain::lead::{Lead, LeadId};
use leadline_core::domain::pipeline::{Pipeline, PipelineId, PipelineStage, StageId};
use leadline_core::domain::EmployeeId;

use super::{
    ApiKeyRepository, BusinessRepository, LeadRepository, OAuthConnectionRepository,
    PipelineRepository, RepositoryError, StageRepository,
};

/// In-process CRM store implementing every repository trait.
///
/// Open-lead uniqueness mirrors the partial unique index of the SQL schema and can be switched off to
/// exercise the bare check-then-insert sequence.
pub struct InMemoryCrmStore {
    businesses: RwLock<HashMap<String, Business>>,
    pipelines: RwLock<HashMap<String, Pipeline>>,
    stages: RwLock<HashMap<String, PipelineStage>>,
    leads: RwLock<HashMap<String, Lead>>,
    connections: RwLock<HashMap<String, OAuthConnection>>,
    api_keys: RwLock<Vec<(ApiKeyEntry, bool)>>,
    enforce_open_lead_uniqueness: bool,
    fail_lead_counts: AtomicBool,
    fail_stage_listing: AtomicBool,
}

impl Default for InMemoryCrmStore {
    fn default() -> Self {
        Self {
            businesses: RwLock::default(),
            pipelines: RwLock::default(),
            stages: RwLock::default(),
            leads: RwLock::default(),
            connections: RwLock::default(),
            api_keys: RwLock::default(),
            enforce_open_lead_uniqueness: true,
            fail_lead_counts: AtomicBool::new(false),
            fail_stage_listing: AtomicBool::new(false),
        }
    }
}

impl InMemoryCrmStore {
    pub fn without_open_lead_constraint() -> Self {
        Self { enforce_open_lead_uniqueness: false, ..Self::default() }
    }

    pub async fn add_business(&self, business: Business) {
        self.businesses.write().await.insert(business.id.0.clone(), business);
    }

    pub async fn add_pipeline(&self, pipeline: Pipeline) {
        self.pipelines.write().await.insert(pipeline.id.0.clone(), pipeline);
    }

    pub async fn add_stage(&self, stage: PipelineStage) {
        self.stages.write().await.insert(stage.id.0.clone(), stage);
    }

    pub async fn add_lead(&self, lead: Lead) {
        self.leads.write().await.insert(lead.id.0.clone(), lead);
    }

    pub async fn add_connection(&self, connection: OAuthConnection) {
        self.connections.write().await.insert(connection.id.clone(), connection);
    }

    pub async fn add_api_key(&self, entry: ApiKeyEntry, active: bool) {
        self.api_keys.write().await.push((entry, active));
    }

    pub async fn leads(&self) -> Vec<Lead> {
        let mut leads: Vec<Lead> = self.leads.read().await.values().cloned().collect();
        leads.sort_by_key(|lead| lead.created_at);
        leads
    }

    pub async fn connection(&self, id: &str) -> Option<OAuthConnection> {
        self.connections.read().await.get(id).cloned()
    }

    /// Makes open-lead counting fail, as a broken database connection would.
    pub fn fail_lead_counts(&self, fail: bool) {
        self.fail_lead_counts.store(fail, Ordering::SeqCst);
    }

    /// Makes previous/next stage listing fail.
    pub fn fail_stage_listing(&self, fail: bool) {
        self.fail_stage_listing.store(fail, Ordering::SeqCst);
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<(), RepositoryError> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepositoryError::Decode(format!("injected failure: {operation}")));
        }
        Ok(())
    }

    async fn neighbors(
        &self,
        pipeline_id: &PipelineId,
        keep: impl Fn(i64) -> bool,
    ) -> Result<Vec<PipelineStage>, RepositoryError> {
        Self::injected(&self.fail_stage_listing, "list stages")?;
        let stages = self.stages.read().await;
        Ok(stages
            .values()
            .filter(|stage| &stage.pipeline_id == pipeline_id && keep(stage.position))
            .cloned()
            .collect())
    }
}

fn open_with_phone<'a>(lead: &'a Lead, phone_number: &str) -> Option<&'a Lead> {
    (lead.is_open() && lead.phone_number.as_deref() == Some(phone_number)).then_some(lead)
}

#[async_trait::async_trait]
impl PipelineRepository for InMemoryCrmStore {
    async fn find_enabled_by_channel(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<Pipeline>, RepositoryError> {
        let pipelines = self.pipelines.read().await;
        Ok(pipelines
            .values()
            .find(|pipeline| {
                pipeline.whatsapp_enabled
                    && pipeline.whatsapp_phone_number_id.as_deref() == Some(phone_number_id)
            })
            .cloned())
    }

    async fn find_by_id(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError> {
        Ok(self.pipelines.read().await.get(&id.0).cloned())
    }
}

#[async_trait::async_trait]
impl StageRepository for InMemoryCrmStore {
    async fn find_input_stage(
        &self,
        pipeline_id: &PipelineId,
    ) -> Result<Option<PipelineStage>, RepositoryError> {
        let stages = self.stages.read().await;
        Ok(stages
            .values()
            .filter(|stage| &stage.pipeline_id == pipeline_id && stage.is_input)
            .min_by_key(|stage| stage.position)
            .cloned())
    }

    async fn find_by_id(&self, id: &StageId) -> Result<Option<PipelineStage>, RepositoryError> {
        Ok(self.stages.read().await.get(&id.0).cloned())
    }

    async fn list_previous(
        &self,
        pipeline_id: &PipelineId,
        position: i64,
    ) -> Result<Vec<PipelineStage>, RepositoryError> {
        let mut stages = self.neighbors(pipeline_id, |candidate| candidate < position).await?;
        stages.sort_by(|a, b| b.position.cmp(&a.position));
        Ok(stages)
    }

    async fn list_next(
        &self,
        pipeline_id: &PipelineId,
        position: i64,
    ) -> Result<Vec<PipelineStage>, RepositoryError> {
        let mut stages = self.neighbors(pipeline_id, |candidate| candidate > position).await?;
        stages.sort_by_key(|stage| stage.position);
        Ok(stages)
    }
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryCrmStore {
    async fn count_open_by_phone(&self, phone_number: &str) -> Result<i64, RepositoryError> {
        Self::injected(&self.fail_lead_counts, "count open leads")?;
        let leads = self.leads.read().await;
        Ok(leads.values().filter_map(|lead| open_with_phone(lead, phone_number)).count() as i64)
    }

    async fn find_open_by_phone(&self, phone_number: &str) -> Result<Option<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        Ok(leads
            .values()
            .filter_map(|lead| open_with_phone(lead, phone_number))
            .min_by_key(|lead| lead.created_at)
            .cloned())
    }

    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.leads.read().await.get(&id.0).cloned())
    }

    async fn insert(&self, lead: Lead) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write().await;
        if self.enforce_open_lead_uniqueness && lead.is_open() {
            if let Some(phone) = lead.phone_number.as_deref() {
                if leads.values().any(|existing| open_with_phone(existing, phone).is_some()) {
                    return Err(RepositoryError::Conflict(format!(
                        "an open lead already exists for phone `{phone}`"
                    )));
                }
            }
        }
        if leads.contains_key(&lead.id.0) {
            return Err(RepositoryError::Conflict(format!("lead `{}` already exists", lead.id)));
        }
        leads.insert(lead.id.0.clone(), lead);
        Ok(())
    }

    async fn update_stage(
        &self,
        id: &LeadId,
        stage_id: &StageId,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        lead.stage_id = stage_id.clone();
        lead.updated_at = updated_at;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl BusinessRepository for InMemoryCrmStore {
    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError> {
        Ok(self.businesses.read().await.get(&id.0).cloned())
    }
}

#[async_trait::async_trait]
impl OAuthConnectionRepository for InMemoryCrmStore {
    async fn find_for_employee(
        &self,
        employee_id: &EmployeeId,
        provider: &str,
    ) -> Result<Option<OAuthConnection>, RepositoryError> {
        let connections = self.connections.read().await;
        Ok(connections
            .values()
            .find(|connection| {
                &connection.employee_id == employee_id && connection.provider == provider
            })
            .cloned())
    }

    async fn update_tokens(
        &self,
        connection_id: &str,
        access_token: &SecretString,
        refresh_token: Option<&SecretString>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(connection_id) {
            connection.access_token = access_token.clone();
            if let Some(refresh_token) = refresh_token {
                connection.refresh_token = Some(refresh_token.clone());
            }
            connection.expires_at = expires_at;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ApiKeyRepository for InMemoryCrmStore {
    async fn list_active(&self) -> Result<Vec<ApiKeyEntry>, RepositoryError> {
        let keys = self.api_keys.read().await;
        Ok(keys.iter().filter(|(_, active)| *active).map(|(entry, _)| entry.clone()).collect())
    }
}
