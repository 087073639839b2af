//! Outbound stage notifications.
//!
//! A dispatch posts the lead, its pipeline context and recent conversation history to the stage's webhook.
//! Failures end at this boundary: they are logged and reported, never propagated to the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use leadline_core::config::DispatchConfig;
use leadline_core::domain::business::Business;
use leadline_core::domain::lead::Lead;
use leadline_core::domain::message::{classify_history, ChatMessage};
use leadline_core::domain::pipeline::{Pipeline, PipelineStage, StageNeighbors};
use leadline_db::RecordStore;
use leadline_whatsapp::{HistoryQuery, MessagingClient};

#[derive(Clone, Debug)]
pub struct DispatchContext {
    pub lead: Lead,
    pub business: Business,
    pub pipeline: Pipeline,
    pub neighbors: StageNeighbors,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("stage webhook request failed: {0}")]
    Transport(String),
    #[error("stage webhook returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    NoTarget,
    Delivered { status: u16, messages: usize },
    Failed(DispatchError),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StageEnvelope<'a> {
    lead: &'a Lead,
    business: &'a Business,
    stage: &'a PipelineStage,
    pipeline: &'a Pipeline,
    previous_stages: &'a [PipelineStage],
    next_stages: &'a [PipelineStage],
    messages: &'a [ChatMessage],
}

#[derive(Clone)]
pub struct Dispatcher {
    http: Client,
    messaging: Arc<dyn MessagingClient>,
    history_limit: u32,
}

impl Dispatcher {
    pub fn new(
        messaging: Arc<dyn MessagingClient>,
        config: &DispatchConfig,
    ) -> Result<Self, reqwest::Error> {
        Self::with_timeout(messaging, Duration::from_secs(config.timeout_secs), config.history_limit)
    }

    pub fn with_timeout(
        messaging: Arc<dyn MessagingClient>,
        timeout: Duration,
        history_limit: u32,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, messaging, history_limit })
    }

    /// Runs [`Dispatcher::dispatch`] on a detached task inside its own span.
    pub fn spawn(&self, stage: PipelineStage, context: DispatchContext) -> JoinHandle<DispatchReport> {
        let dispatcher = self.clone();
        let span = info_span!(
            "stage_dispatch",
            lead_id = %context.lead.id,
            stage_id = %stage.id,
            pipeline_id = %context.pipeline.id
        );
        tokio::spawn(async move { dispatcher.dispatch(&stage, &context).await }.instrument(span))
    }

    pub async fn dispatch(&self, stage: &PipelineStage, context: &DispatchContext) -> DispatchReport {
        let Some(target) = stage.webhook_target() else {
            debug!(event_name = "dispatch.skipped.no_target", stage_id = %stage.id);
            return DispatchReport::NoTarget;
        };

        let messages = self.recent_messages(context).await;
        let envelope = StageEnvelope {
            lead: &context.lead,
            business: &context.business,
            stage,
            pipeline: &context.pipeline,
            previous_stages: &context.neighbors.previous,
            next_stages: &context.neighbors.next,
            messages: &messages,
        };

        match self.post(target, &envelope).await {
            Ok(status) => {
                info!(
                    event_name = "dispatch.delivered",
                    lead_id = %context.lead.id,
                    stage_id = %stage.id,
                    status,
                    messages = messages.len(),
                    "stage webhook delivered"
                );
                DispatchReport::Delivered { status, messages: messages.len() }
            }
            Err(error) => {
                match &error {
                    DispatchError::Status { status, body } => warn!(
                        event_name = "dispatch.rejected",
                        lead_id = %context.lead.id,
                        stage_id = %stage.id,
                        status,
                        body = %body,
                        "stage webhook returned a non-success status"
                    ),
                    DispatchError::Transport(detail) => warn!(
                        event_name = "dispatch.failed",
                        lead_id = %context.lead.id,
                        stage_id = %stage.id,
                        error = %detail,
                        "stage webhook request failed"
                    ),
                }
                DispatchReport::Failed(error)
            }
        }
    }

    async fn post(&self, target: &str, envelope: &StageEnvelope<'_>) -> Result<u16, DispatchError> {
        let response = self
            .http
            .post(target)
            .json(envelope)
            .send()
            .await
            .map_err(|error| DispatchError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status { status: status.as_u16(), body });
        }
        Ok(status.as_u16())
    }

    /// Last messages of the lead's conversation, or nothing when the history is unavailable.
    async fn recent_messages(&self, context: &DispatchContext) -> Vec<ChatMessage> {
        let lead = &context.lead;
        let (Some(phone), Some(conversation_id), Some(channel_id)) = (
            lead.phone(),
            lead.conversation_id.as_deref().filter(|value| !value.trim().is_empty()),
            context.pipeline.channel_id(),
        ) else {
            return Vec::new();
        };

        let query = HistoryQuery::conversation(phone, conversation_id, self.history_limit);
        match self.messaging.get_messages(channel_id, &query).await {
            Ok(page) => classify_history(&page.data, phone),
            Err(error) => {
                warn!(
                    event_name = "dispatch.history.unavailable",
                    lead_id = %lead.id,
                    error = %error,
                    "conversation history fetch failed; dispatching without messages"
                );
                Vec::new()
            }
        }
    }
}

/// Loads previous and next stages concurrently; a failing side logs and yields an empty list.
pub async fn load_neighbors(store: &RecordStore, stage: &PipelineStage) -> StageNeighbors {
    let (previous, next) = tokio::join!(
        store.stages.list_previous(&stage.pipeline_id, stage.position),
        store.stages.list_next(&stage.pipeline_id, stage.position),
    );

    let previous = previous.unwrap_or_else(|error| {
        warn!(event_name = "stages.previous.unavailable", stage_id = %stage.id, error = %error);
        Vec::new()
    });
    let next = next.unwrap_or_else(|error| {
        warn!(event_name = "stages.next.unavailable", stage_id = %stage.id, error = %error);
        Vec::new()
    });

    StageNeighbors { previous, next }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use leadline_core::domain::lead::LeadId;
    use leadline_core::domain::pipeline::StageNeighbors;
    use leadline_db::RecordStore;
    use serde_json::json;

    use super::{load_neighbors, DispatchContext, DispatchError, DispatchReport, Dispatcher};
    use crate::test_support::{
        business, input_stage, open_lead, pipeline, seeded_store, spawn_sink, RecordingMessaging,
    };

    fn context(lead_phone: &str) -> DispatchContext {
        DispatchContext {
            lead: open_lead(LeadId("lead-1".to_string()), lead_phone, Utc::now()),
            business: business(),
            pipeline: pipeline(),
            neighbors: StageNeighbors::default(),
        }
    }

    fn dispatcher(messaging: Arc<RecordingMessaging>, timeout: Duration) -> Dispatcher {
        Dispatcher::with_timeout(messaging, timeout, 10).expect("dispatcher")
    }

    #[tokio::test]
    async fn stage_without_webhook_is_a_no_op() {
        let messaging = Arc::new(RecordingMessaging::default());
        let report = dispatcher(messaging.clone(), Duration::from_secs(1))
            .dispatch(&input_stage(None), &context("5511999990000"))
            .await;

        assert_eq!(report, DispatchReport::NoTarget);
        assert_eq!(messaging.history_calls(), 0);
    }

    #[tokio::test]
    async fn envelope_carries_classified_history() {
        let sink = spawn_sink(Duration::ZERO).await;
        let messaging = Arc::new(RecordingMessaging::with_history(vec![
            json!({"id": "m1", "from": "+55 11 99999-0000", "text": {"body": "Quero um orçamento"}}),
            json!({"id": "m2", "from": "agent-7", "body": "Claro!"}),
            json!({"id": "m3", "from": "agent-7", "message": "   "}),
        ]));

        let report = dispatcher(messaging.clone(), Duration::from_secs(5))
            .dispatch(&input_stage(Some(sink.url("/hook"))), &context("5511999990000"))
            .await;

        assert!(matches!(report, DispatchReport::Delivered { status: 200, messages: 2 }));
        assert_eq!(messaging.last_history_limit(), Some(10));

        let received = sink.received();
        let envelope = &received[0];
        assert_eq!(envelope["lead"]["id"], "lead-1");
        assert_eq!(envelope["stage"]["id"], "stage-1");
        assert!(envelope["previousStages"].as_array().expect("array").is_empty());
        assert_eq!(envelope["messages"][0]["type"], "customer");
        assert_eq!(envelope["messages"][0]["text"], "Quero um orçamento");
        assert_eq!(envelope["messages"][1]["type"], "salesperson");
        assert_eq!(envelope["messages"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn history_failure_still_dispatches() {
        let sink = spawn_sink(Duration::ZERO).await;
        let messaging = Arc::new(RecordingMessaging::failing_history());

        let report = dispatcher(messaging, Duration::from_secs(5))
            .dispatch(&input_stage(Some(sink.url("/hook"))), &context("5511999990000"))
            .await;

        assert!(matches!(report, DispatchReport::Delivered { messages: 0, .. }));
        assert_eq!(sink.received()[0]["messages"], json!([]));
    }

    #[tokio::test]
    async fn non_success_status_is_reported_not_raised() {
        let sink = spawn_sink(Duration::ZERO).await;
        let messaging = Arc::new(RecordingMessaging::default());

        let report = dispatcher(messaging, Duration::from_secs(5))
            .dispatch(&input_stage(Some(sink.url("/fail"))), &context("5511999990000"))
            .await;

        match report {
            DispatchReport::Failed(DispatchError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_target_times_out() {
        let sink = spawn_sink(Duration::from_secs(2)).await;
        let messaging = Arc::new(RecordingMessaging::default());

        let handle = dispatcher(messaging, Duration::from_millis(150))
            .spawn(input_stage(Some(sink.url("/hook"))), context("5511999990000"));

        let report = handle.await.expect("dispatch task");
        assert!(matches!(report, DispatchReport::Failed(DispatchError::Transport(_))));
    }

    #[tokio::test]
    async fn neighbor_listing_failure_yields_empty_lists() {
        let store = seeded_store(None).await;
        let records = RecordStore::in_memory(Arc::clone(&store));

        let neighbors = load_neighbors(&records, &input_stage(None)).await;
        assert_eq!(neighbors.next.len(), 3);

        store.fail_stage_listing(true);
        let neighbors = load_neighbors(&records, &input_stage(None)).await;
        assert!(neighbors.previous.is_empty());
        assert!(neighbors.next.is_empty());
    }
}
