//! Inbound message intake: resolve the pipeline for a channel and create or skip the open lead.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use leadline_core::domain::lead::{Lead, LeadId, NewLead, UNKNOWN_CONTACT_NAME};
use leadline_core::domain::pipeline::{Pipeline, PipelineStage};
use leadline_core::errors::FlowError;
use leadline_core::outcome::Outcome;
use leadline_db::{RecordStore, RepositoryError};

use crate::dispatch::{load_neighbors, DispatchContext, DispatchReport, Dispatcher};
use crate::locks::PhoneLocks;

const SCOPES: [&str; 3] = ["metadata", "contact", "conversation"];
const PHONE_NUMBER_ID_KEYS: [&str; 2] = ["phoneNumberId", "phone_number_id"];
const CONTACT_NAME_KEYS: [&str; 4] = ["contactName", "contact_name", "customerName", "customer_name"];
const PHONE_NUMBER_KEYS: [&str; 3] = ["phoneNumber", "phone_number", "phone"];
const EMAIL_KEYS: [&str; 2] = ["email", "contactEmail"];
const CONVERSATION_ID_KEYS: [&str; 2] = ["conversationId", "conversation_id"];

/// Conversation metadata carried by an inbound message event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub phone_number_id: String,
    pub contact_name: String,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub conversation_id: Option<String>,
}

impl InboundEvent {
    /// Accepts top-level camelCase or snake_case fields, or the same fields nested under
    /// `metadata`, `contact` or `conversation`.
    pub fn from_value(body: &Value) -> Result<Self, FlowError> {
        let phone_number_id = lookup(body, &PHONE_NUMBER_ID_KEYS)
            .ok_or_else(|| FlowError::validation("missing required field `phoneNumberId`"))?;

        let contact_name = lookup(body, &CONTACT_NAME_KEYS)
            .or_else(|| nested(body, "contact", "name"))
            .unwrap_or_else(|| UNKNOWN_CONTACT_NAME.to_string());
        let conversation_id =
            lookup(body, &CONVERSATION_ID_KEYS).or_else(|| nested(body, "conversation", "id"));

        Ok(Self {
            phone_number_id,
            contact_name,
            phone_number: lookup(body, &PHONE_NUMBER_KEYS),
            email: lookup(body, &EMAIL_KEYS),
            conversation_id,
        })
    }
}

fn lookup(body: &Value, keys: &[&str]) -> Option<String> {
    std::iter::once(Some(body))
        .chain(SCOPES.iter().map(|scope| body.get(*scope)))
        .flatten()
        .find_map(|scope| keys.iter().find_map(|key| scope.get(*key).and_then(scalar_text)))
}

fn nested(body: &Value, scope: &str, key: &str) -> Option<String> {
    body.get(scope)?.get(key).and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_lead_count: Option<i64>,
}

/// The intake outcome plus the handle of the spawned stage dispatch, if one was started.
pub struct IntakeResult {
    pub outcome: Outcome<IntakeData>,
    pub dispatch: Option<JoinHandle<DispatchReport>>,
}

enum LeadEntry {
    Created(Lead),
    Existing { lead_id: Option<LeadId>, open_count: i64 },
}

pub struct IntakeOrchestrator {
    store: RecordStore,
    dispatcher: Dispatcher,
    locks: PhoneLocks,
}

impl IntakeOrchestrator {
    pub fn new(store: RecordStore, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher, locks: PhoneLocks::new() }
    }

    /// Processes one raw event body; the spawned dispatch keeps running if the handle is dropped.
    pub async fn handle_inbound_event(&self, raw: &[u8]) -> Outcome<IntakeData> {
        self.process(raw).await.outcome
    }

    pub async fn process(&self, raw: &[u8]) -> IntakeResult {
        let correlation_id = Uuid::new_v4().to_string();
        let span = info_span!("intake", correlation_id = %correlation_id);

        async {
            match self.run(raw).await {
                Ok(result) => result,
                Err(error) => {
                    warn!(
                        event_name = "intake.failed",
                        error_class = error.class().as_str(),
                        error = %error,
                        "inbound event rejected"
                    );
                    IntakeResult { outcome: Outcome::failure(&error), dispatch: None }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, raw: &[u8]) -> Result<IntakeResult, FlowError> {
        let body: Value = serde_json::from_slice(raw)
            .map_err(|error| FlowError::validation(format!("invalid JSON body: {error}")))?;
        let event = InboundEvent::from_value(&body)?;

        let pipeline = self
            .store
            .pipelines
            .find_enabled_by_channel(&event.phone_number_id)
            .await?
            .ok_or_else(|| {
                FlowError::not_found(
                    "pipeline",
                    format!("no enabled pipeline for channel {}", event.phone_number_id),
                )
            })?;

        let (business, input_stage) = tokio::join!(
            self.store.businesses.find_by_id(&pipeline.business_id),
            self.store.stages.find_input_stage(&pipeline.id),
        );
        let business = business?.ok_or_else(|| {
            FlowError::not_found(
                "business",
                format!("business {} of pipeline {}", pipeline.business_id.0, pipeline.id),
            )
        })?;
        let input_stage = input_stage?.ok_or_else(|| {
            FlowError::not_found("input stage", format!("pipeline {} has no input stage", pipeline.id))
        })?;

        match self.create_or_skip(&pipeline, &input_stage, &event).await? {
            LeadEntry::Existing { lead_id, open_count } => {
                info!(
                    event_name = "intake.lead.skipped",
                    pipeline_id = %pipeline.id,
                    open_lead_count = open_count,
                    "open lead already exists for phone number"
                );
                let data = IntakeData {
                    lead_id: lead_id.map(|id| id.0),
                    open_lead_count: Some(open_count),
                };
                Ok(IntakeResult {
                    outcome: Outcome::skipped("open lead already exists for this phone number", data),
                    dispatch: None,
                })
            }
            LeadEntry::Created(lead) => {
                info!(
                    event_name = "intake.lead.created",
                    lead_id = %lead.id,
                    pipeline_id = %pipeline.id,
                    stage_id = %input_stage.id,
                    "lead created at input stage"
                );
                let lead_id = lead.id.0.clone();
                let neighbors = load_neighbors(&self.store, &input_stage).await;
                let context = DispatchContext { lead, business, pipeline, neighbors };
                let dispatch = self.dispatcher.spawn(input_stage, context);

                let data = IntakeData { lead_id: Some(lead_id), open_lead_count: None };
                Ok(IntakeResult {
                    outcome: Outcome::success("lead created", data),
                    dispatch: Some(dispatch),
                })
            }
        }
    }

    /// Check-then-insert under the phone number's lock; the unique index catches writers in other
    /// processes.
    async fn create_or_skip(
        &self,
        pipeline: &Pipeline,
        input_stage: &PipelineStage,
        event: &InboundEvent,
    ) -> Result<LeadEntry, FlowError> {
        let phone = event
            .phone_number
            .as_deref()
            .ok_or_else(|| FlowError::validation("missing required field `phoneNumber`"))?;

        let _guard = self.locks.acquire(phone).await;

        let open_count = self
            .store
            .leads
            .count_open_by_phone(phone)
            .await
            .map_err(|error| FlowError::upstream(format!("failed to count open leads: {error}")))?;

        if open_count > 0 {
            let existing = self.store.leads.find_open_by_phone(phone).await?;
            return Ok(LeadEntry::Existing { lead_id: existing.map(|lead| lead.id), open_count });
        }

        let lead = NewLead {
            pipeline_id: pipeline.id.clone(),
            stage_id: input_stage.id.clone(),
            customer_name: event.contact_name.clone(),
            phone_number: phone.to_string(),
            email: event.email.clone(),
            conversation_id: event.conversation_id.clone(),
        }
        .into_lead(LeadId::generate(), Utc::now());

        match self.store.leads.insert(lead.clone()).await {
            Ok(()) => Ok(LeadEntry::Created(lead)),
            Err(RepositoryError::Conflict(detail)) => {
                warn!(
                    event_name = "intake.lead.conflict",
                    detail = %detail,
                    "open lead inserted concurrently"
                );
                let existing = self.store.leads.find_open_by_phone(phone).await?;
                Ok(LeadEntry::Existing { lead_id: existing.map(|lead| lead.id), open_count: 1 })
            }
            Err(error) => Err(error.into()),
        }
    }
}
