//! Outbound WhatsApp replies: operator replies, direct channel sends and agent responses.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use leadline_core::domain::lead::LeadId;
use leadline_core::errors::FlowError;
use leadline_core::outcome::Outcome;
use leadline_db::RecordStore;
use leadline_whatsapp::{MessagingClient, OutboundText};

use crate::commands::required_id;

const RELAYED_EVENTS: [&str; 3] = ["agent.response", "ai.response", "assistant.response"];

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

fn text_field(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        body.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

/// Agent responses arrive as plain text or as `{text}` / `{message}` objects.
fn response_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Object(_) => text_field(value, &["text", "message", "body"]),
        _ => None,
    }
}

pub struct ReplyRelay {
    store: RecordStore,
    messaging: Arc<dyn MessagingClient>,
}

impl ReplyRelay {
    pub fn new(store: RecordStore, messaging: Arc<dyn MessagingClient>) -> Self {
        Self { store, messaging }
    }

    /// `{leadId, message}` replies to the lead's phone on its pipeline channel; `{channelId, to,
    /// message}` addresses the channel directly.
    pub async fn reply(&self, body: &Value) -> Outcome<RelayData> {
        self.boundary("relay.reply.failed", self.reply_inner(body).await)
    }

    /// Direct send on a known channel, as used by the messages proxy.
    pub async fn send_on_channel(&self, channel_id: &str, body: &Value) -> Outcome<RelayData> {
        let result = async {
            let to = text_field(body, &["to", "phoneNumber"])
                .ok_or_else(|| FlowError::validation("missing required field `to`"))?;
            self.send(channel_id, to, body).await
        }
        .await;
        self.boundary("relay.send.failed", result)
    }

    pub async fn agent_event(&self, body: &Value) -> Outcome<RelayData> {
        self.boundary("relay.agent_event.failed", self.agent_event_inner(body).await)
    }

    fn boundary(
        &self,
        event_name: &'static str,
        result: Result<Outcome<RelayData>, FlowError>,
    ) -> Outcome<RelayData> {
        result.unwrap_or_else(|error| {
            warn!(
                event_name,
                error_class = error.class().as_str(),
                error = %error,
                "message relay failed"
            );
            Outcome::failure(&error)
        })
    }

    async fn reply_inner(&self, body: &Value) -> Result<Outcome<RelayData>, FlowError> {
        if body.get("leadId").is_none() {
            let channel_id = text_field(body, &["channelId", "phoneNumberId"]).ok_or_else(|| {
                FlowError::validation("missing required field `leadId` or `channelId`")
            })?;
            let to = text_field(body, &["to", "phoneNumber"])
                .ok_or_else(|| FlowError::validation("missing required field `to`"))?;
            return self.send(&channel_id, to, body).await;
        }

        let lead_id = LeadId(required_id(body, &["leadId"])?);
        let lead = self
            .store
            .leads
            .find_by_id(&lead_id)
            .await?
            .ok_or_else(|| FlowError::not_found("lead", lead_id.0.clone()))?;
        let to = lead
            .phone()
            .ok_or_else(|| FlowError::validation(format!("lead {} has no phone number", lead.id)))?
            .to_string();
        let pipeline = self
            .store
            .pipelines
            .find_by_id(&lead.pipeline_id)
            .await?
            .ok_or_else(|| FlowError::not_found("pipeline", lead.pipeline_id.0.clone()))?;
        let channel_id = pipeline
            .channel_id()
            .filter(|_| pipeline.whatsapp_enabled)
            .ok_or_else(|| {
                FlowError::validation(format!(
                    "pipeline {} has no enabled WhatsApp channel",
                    pipeline.id
                ))
            })?
            .to_string();

        self.send(&channel_id, to, body).await
    }

    async fn agent_event_inner(&self, body: &Value) -> Result<Outcome<RelayData>, FlowError> {
        let event = text_field(body, &["event", "type"]).unwrap_or_default();
        if !RELAYED_EVENTS.contains(&event.as_str()) {
            let message = format!("event `{event}` is not relayed");
            return Ok(Outcome::skipped(message, RelayData::default()));
        }

        let data = body.get("data").unwrap_or(&Value::Null);
        let Some(text) = data.get("response").and_then(response_text) else {
            let message = "agent event carries no response text";
            return Ok(Outcome::skipped(message, RelayData::default()));
        };
        let channel_id = text_field(data, &["phoneNumberId", "phone_number_id"])
            .ok_or_else(|| FlowError::validation("missing required field `data.phoneNumberId`"))?;
        let to = text_field(data, &["phoneNumber", "phone_number"])
            .ok_or_else(|| FlowError::validation("missing required field `data.phoneNumber`"))?;

        let message = OutboundText::new(to.clone(), text);
        let receipt = self.messaging.send_message(&channel_id, &message).await?;
        info!(
            event_name = "relay.agent_response.sent",
            channel_id = %channel_id,
            "agent response relayed"
        );

        let data = RelayData {
            channel_id: Some(channel_id),
            to: Some(to),
            message_id: receipt.message_id,
        };
        Ok(Outcome::success("agent response relayed", data))
    }

    async fn send(
        &self,
        channel_id: &str,
        to: String,
        body: &Value,
    ) -> Result<Outcome<RelayData>, FlowError> {
        let text = text_field(body, &["message", "text", "body"])
            .ok_or_else(|| FlowError::validation("missing required field `message`"))?;
        let message = OutboundText {
            to: to.clone(),
            body: text,
            preview_url: body.get("previewUrl").and_then(Value::as_bool).unwrap_or(false),
        };

        let receipt = self.messaging.send_message(channel_id, &message).await?;
        info!(event_name = "relay.reply.sent", channel_id = %channel_id, "reply sent");

        let data = RelayData {
            channel_id: Some(channel_id.to_string()),
            to: Some(to),
            message_id: receipt.message_id,
        };
        Ok(Outcome::success("message sent", data))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use leadline_core::domain::lead::LeadId;
    use leadline_core::errors::ErrorClass;
    use leadline_core::outcome::OutcomeStatus;
    use leadline_db::RecordStore;
    use leadline_whatsapp::DisabledMessagingClient;

    use super::ReplyRelay;
    use crate::test_support::{open_lead, seeded_store, RecordingMessaging, CHANNEL};

    async fn relay() -> (Arc<RecordingMessaging>, ReplyRelay) {
        let store = seeded_store(None).await;
        store.add_lead(open_lead(LeadId("lead-1".to_string()), "5511999990000", Utc::now())).await;
        let messaging = Arc::new(RecordingMessaging::default());
        (messaging.clone(), ReplyRelay::new(RecordStore::in_memory(store), messaging))
    }

    #[tokio::test]
    async fn lead_reply_uses_lead_phone_and_pipeline_channel() {
        let (messaging, relay) = relay().await;

        let outcome = relay
            .reply(&json!({"leadId": "lead-1", "message": "Olá Maria", "previewUrl": true}))
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.data.message_id.as_deref(), Some("wamid.test"));
        let sent = messaging.sent();
        assert_eq!(sent[0].0, CHANNEL);
        assert_eq!(sent[0].1.to, "5511999990000");
        assert!(sent[0].1.preview_url);
    }

    #[tokio::test]
    async fn reply_requires_message_text() {
        let (messaging, relay) = relay().await;

        let outcome = relay.reply(&json!({"leadId": "lead-1"})).await;

        assert_eq!(outcome.error_class, Some(ErrorClass::Validation));
        assert!(messaging.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_lead_is_not_found() {
        let (_, relay) = relay().await;

        let outcome = relay.reply(&json!({"leadId": "missing", "message": "hi"})).await;

        assert_eq!(outcome.error_class, Some(ErrorClass::NotFound));
    }

    #[tokio::test]
    async fn agent_response_is_relayed_and_other_events_skipped() {
        let (messaging, relay) = relay().await;

        let relayed = relay
            .agent_event(&json!({
                "event": "agent.response",
                "data": {
                    "phoneNumberId": CHANNEL,
                    "phoneNumber": "5511999990000",
                    "response": {"text": "Podemos agendar?"}
                }
            }))
            .await;
        let ignored = relay.agent_event(&json!({"event": "agent.typing", "data": {}})).await;

        assert_eq!(relayed.status, OutcomeStatus::Success);
        assert_eq!(ignored.status, OutcomeStatus::Skipped);
        assert_eq!(messaging.sent().len(), 1);
        assert_eq!(messaging.sent()[0].1.body, "Podemos agendar?");
    }

    #[tokio::test]
    async fn unconfigured_provider_is_an_upstream_error() {
        let store = seeded_store(None).await;
        let relay =
            ReplyRelay::new(RecordStore::in_memory(store), Arc::new(DisabledMessagingClient));

        let outcome = relay
            .send_on_channel(CHANNEL, &json!({"to": "5511999990000", "message": "hi"}))
            .await;

        assert_eq!(outcome.error_class, Some(ErrorClass::Upstream));
    }
}
