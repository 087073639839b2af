//! Operator and automation commands that mutate leads.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use leadline_core::domain::lead::{Lead, LeadId};
use leadline_core::domain::pipeline::{PipelineStage, StageId};
use leadline_core::errors::FlowError;
use leadline_core::outcome::Outcome;
use leadline_db::RecordStore;

use crate::dispatch::{load_neighbors, DispatchContext, DispatchReport, Dispatcher};

/// Reads an identifier that may arrive as a string or an integer.
pub(crate) fn required_id(body: &Value, keys: &[&'static str]) -> Result<String, FlowError> {
    let Some((key, value)) = keys.iter().find_map(|key| body.get(*key).map(|value| (*key, value)))
    else {
        return Err(FlowError::validation(format!("missing required field `{}`", keys[0])));
    };

    match value {
        Value::String(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(number.to_string()),
        Value::String(_) | Value::Null => {
            Err(FlowError::validation(format!("missing required field `{key}`")))
        }
        _ => Err(FlowError::validation(format!("`{key}` must be a string or integer"))),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChangeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_stage_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

pub struct StageChange {
    pub outcome: Outcome<StageChangeData>,
    pub dispatch: Option<JoinHandle<DispatchReport>>,
}

pub struct CommandHandlers {
    store: RecordStore,
    dispatcher: Dispatcher,
}

impl CommandHandlers {
    pub fn new(store: RecordStore, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub async fn change_stage(&self, body: &Value) -> Outcome<StageChangeData> {
        self.process_change_stage(body).await.outcome
    }

    pub async fn process_change_stage(&self, body: &Value) -> StageChange {
        match self.move_lead(body).await {
            Ok(change) => change,
            Err(error) => {
                warn!(
                    event_name = "command.change_stage.failed",
                    error_class = error.class().as_str(),
                    error = %error,
                    "stage change rejected"
                );
                StageChange { outcome: Outcome::failure(&error), dispatch: None }
            }
        }
    }

    async fn move_lead(&self, body: &Value) -> Result<StageChange, FlowError> {
        let lead_id = LeadId(required_id(body, &["leadId", "lead_id"])?);
        let stage_id = StageId(required_id(body, &["newStageId", "new_stage_id"])?);

        let lead = self
            .store
            .leads
            .find_by_id(&lead_id)
            .await?
            .ok_or_else(|| FlowError::not_found("lead", lead_id.0.clone()))?;
        let stage = self
            .store
            .stages
            .find_by_id(&stage_id)
            .await?
            .ok_or_else(|| FlowError::not_found("stage", stage_id.0.clone()))?;

        if stage.pipeline_id != lead.pipeline_id {
            return Err(FlowError::validation(format!(
                "stage {} does not belong to pipeline {}",
                stage.id, lead.pipeline_id
            )));
        }

        let previous_stage_id = lead.stage_id.0.clone();
        if lead.is_at_stage(&stage.id) {
            let data = StageChangeData {
                lead_id: Some(lead.id.0.clone()),
                stage_id: Some(stage.id.0.clone()),
                previous_stage_id: Some(previous_stage_id),
                changed: Some(false),
            };
            return Ok(StageChange {
                outcome: Outcome::success("lead already at requested stage", data),
                dispatch: None,
            });
        }

        let now = Utc::now();
        if !self.store.leads.update_stage(&lead.id, &stage.id, now).await? {
            return Err(FlowError::not_found("lead", lead.id.0.clone()));
        }
        info!(
            event_name = "command.change_stage.applied",
            lead_id = %lead.id,
            from_stage_id = %previous_stage_id,
            to_stage_id = %stage.id,
            "lead moved to new stage"
        );

        let data = StageChangeData {
            lead_id: Some(lead.id.0.clone()),
            stage_id: Some(stage.id.0.clone()),
            previous_stage_id: Some(previous_stage_id),
            changed: Some(true),
        };
        let moved = Lead { stage_id: stage.id.clone(), updated_at: now, ..lead };
        let dispatch = self.notify_stage(stage, moved).await;

        Ok(StageChange { outcome: Outcome::success("lead moved to stage", data), dispatch })
    }

    /// Fires the new stage's webhook; missing pipeline context only skips the notification.
    async fn notify_stage(
        &self,
        stage: PipelineStage,
        lead: Lead,
    ) -> Option<JoinHandle<DispatchReport>> {
        stage.webhook_target()?;

        let pipeline = match self.store.pipelines.find_by_id(&lead.pipeline_id).await {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                warn!(event_name = "command.change_stage.no_pipeline", lead_id = %lead.id);
                return None;
            }
            Err(error) => {
                warn!(
                    event_name = "command.change_stage.no_pipeline",
                    lead_id = %lead.id,
                    error = %error
                );
                return None;
            }
        };
        let business = match self.store.businesses.find_by_id(&pipeline.business_id).await {
            Ok(Some(business)) => business,
            Ok(None) => {
                warn!(event_name = "command.change_stage.no_business", lead_id = %lead.id);
                return None;
            }
            Err(error) => {
                warn!(
                    event_name = "command.change_stage.no_business",
                    lead_id = %lead.id,
                    error = %error
                );
                return None;
            }
        };

        let neighbors = load_neighbors(&self.store, &stage).await;
        Some(self.dispatcher.spawn(stage, DispatchContext { lead, business, pipeline, neighbors }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use leadline_core::domain::lead::LeadId;
    use leadline_core::domain::pipeline::StageId;
    use leadline_core::errors::ErrorClass;
    use leadline_core::outcome::OutcomeStatus;
    use leadline_db::repositories::InMemoryCrmStore;
    use leadline_db::RecordStore;

    use super::{required_id, CommandHandlers};
    use crate::dispatch::{DispatchReport, Dispatcher};
    use crate::test_support::{open_lead, seeded_store, spawn_sink, RecordingMessaging};

    async fn handlers(webhook_url: Option<String>) -> (Arc<InMemoryCrmStore>, CommandHandlers) {
        let store = seeded_store(webhook_url).await;
        store.add_lead(open_lead(LeadId("lead-1".to_string()), "5511999990000", Utc::now())).await;
        let dispatcher = Dispatcher::with_timeout(
            Arc::new(RecordingMessaging::default()),
            Duration::from_secs(5),
            10,
        )
        .expect("dispatcher");
        let handlers = CommandHandlers::new(RecordStore::in_memory(Arc::clone(&store)), dispatcher);
        (store, handlers)
    }

    #[test]
    fn identifiers_accept_strings_and_integers_only() {
        assert_eq!(required_id(&json!({"leadId": 42}), &["leadId"]).expect("int"), "42");
        assert_eq!(required_id(&json!({"leadId": " a-1 "}), &["leadId"]).expect("str"), "a-1");
        assert!(required_id(&json!({"leadId": true}), &["leadId"]).is_err());
        assert!(required_id(&json!({"leadId": 1.5}), &["leadId"]).is_err());
        assert!(required_id(&json!({}), &["leadId"]).is_err());
    }

    #[tokio::test]
    async fn moving_to_current_stage_succeeds_without_write() {
        let (store, handlers) = handlers(None).await;
        let before = store.leads().await[0].updated_at;

        let change = handlers
            .process_change_stage(&json!({"leadId": "lead-1", "newStageId": "stage-1"}))
            .await;

        assert_eq!(change.outcome.status, OutcomeStatus::Success);
        assert_eq!(change.outcome.data.changed, Some(false));
        assert!(change.dispatch.is_none());
        assert_eq!(store.leads().await[0].updated_at, before);
    }

    #[tokio::test]
    async fn stage_change_updates_lead_and_fires_new_stage_webhook() {
        let sink = spawn_sink(Duration::ZERO).await;
        let (store, handlers) = handlers(Some(sink.url("/hook"))).await;

        let change = handlers
            .process_change_stage(&json!({"leadId": "lead-1", "newStageId": "stage-3"}))
            .await;

        assert_eq!(change.outcome.status, OutcomeStatus::Success);
        assert_eq!(change.outcome.data.previous_stage_id.as_deref(), Some("stage-1"));
        assert_eq!(store.leads().await[0].stage_id, StageId("stage-3".to_string()));

        let report = change.dispatch.expect("dispatch").await.expect("dispatch task");
        assert!(matches!(report, DispatchReport::Delivered { .. }));
        let envelope = &sink.received()[0];
        assert_eq!(envelope["stage"]["id"], "stage-3");
        assert_eq!(envelope["lead"]["stage_id"], "stage-3");
        assert_eq!(envelope["previousStages"][0]["id"], "stage-2");
    }

    #[tokio::test]
    async fn unknown_lead_or_stage_is_not_found_without_mutation() {
        let (store, handlers) = handlers(None).await;

        let missing_lead =
            handlers.change_stage(&json!({"leadId": "nope", "newStageId": "stage-2"})).await;
        let missing_stage =
            handlers.change_stage(&json!({"leadId": "lead-1", "newStageId": "nope"})).await;

        assert_eq!(missing_lead.error_class, Some(ErrorClass::NotFound));
        assert!(missing_lead.message.contains("lead"));
        assert_eq!(missing_stage.error_class, Some(ErrorClass::NotFound));
        assert!(missing_stage.message.contains("stage"));
        assert_eq!(store.leads().await[0].stage_id, StageId("stage-1".to_string()));
    }

    #[tokio::test]
    async fn stage_from_another_pipeline_is_rejected() {
        let (store, handlers) = handlers(None).await;

        let outcome = handlers
            .change_stage(&json!({"leadId": "lead-1", "newStageId": "stage-other-1"}))
            .await;

        assert_eq!(outcome.error_class, Some(ErrorClass::Validation));
        assert_eq!(store.leads().await[0].stage_id, StageId("stage-1".to_string()));
    }

    #[tokio::test]
    async fn non_scalar_identifier_is_a_validation_error() {
        let (_, handlers) = handlers(None).await;

        let outcome =
            handlers.change_stage(&json!({"leadId": ["lead-1"], "newStageId": "stage-2"})).await;

        assert_eq!(outcome.error_class, Some(ErrorClass::Validation));
    }
}
