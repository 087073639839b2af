use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use leadline_core::errors::FlowError;

pub const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("messaging provider is not configured")]
    NotConfigured,
    #[error("invalid messaging request: {0}")]
    InvalidRequest(String),
    #[error("messaging transport failure: {0}")]
    Transport(String),
    #[error("messaging provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode messaging response: {0}")]
    Decode(String),
}

impl From<MessagingError> for FlowError {
    fn from(error: MessagingError) -> Self {
        match error {
            MessagingError::InvalidRequest(message) => FlowError::validation(message),
            other => FlowError::upstream(other.to_string()),
        }
    }
}

/// History filter for one conversation. `limit` is clamped to `1..=MAX_HISTORY_LIMIT`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub phone_number: Option<String>,
    pub conversation_id: Option<String>,
    pub limit: u32,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl HistoryQuery {
    pub fn conversation(phone_number: &str, conversation_id: &str, limit: u32) -> Self {
        Self {
            phone_number: Some(phone_number.to_string()),
            conversation_id: Some(conversation_id.to_string()),
            limit,
            before: None,
            after: None,
        }
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_HISTORY_LIMIT)
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("limit", self.effective_limit().to_string())];
        let optional = [
            ("phone_number", &self.phone_number),
            ("conversation_id", &self.conversation_id),
            ("before", &self.before),
            ("after", &self.after),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                pairs.push((key, value.to_string()));
            }
        }
        pairs
    }
}

/// One page of raw provider history records, newest last.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundText {
    pub to: String,
    pub body: String,
    pub preview_url: bool,
}

impl OutboundText {
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self { to: to.into(), body: body.into(), preview_url: false }
    }

    pub fn validate(&self) -> Result<(), MessagingError> {
        if self.to.trim().is_empty() {
            return Err(MessagingError::InvalidRequest("recipient phone number is required".into()));
        }
        if self.body.trim().is_empty() {
            return Err(MessagingError::InvalidRequest("message body is required".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub provider_response: Value,
}

impl SendReceipt {
    pub fn from_provider(response: Value) -> Self {
        let message_id = response
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.first())
            .and_then(|message| message.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { message_id, provider_response: response }
    }
}

#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn get_messages(
        &self,
        channel_id: &str,
        query: &HistoryQuery,
    ) -> Result<MessagePage, MessagingError>;

    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutboundText,
    ) -> Result<SendReceipt, MessagingError>;
}

/// Stand-in used when no provider credentials are configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledMessagingClient;

#[async_trait]
impl MessagingClient for DisabledMessagingClient {
    async fn get_messages(
        &self,
        _channel_id: &str,
        _query: &HistoryQuery,
    ) -> Result<MessagePage, MessagingError> {
        Err(MessagingError::NotConfigured)
    }

    async fn send_message(
        &self,
        _channel_id: &str,
        _message: &OutboundText,
    ) -> Result<SendReceipt, MessagingError> {
        Err(MessagingError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{HistoryQuery, OutboundText, SendReceipt, MAX_HISTORY_LIMIT};

    #[test]
    fn history_limit_is_clamped() {
        let mut query = HistoryQuery::conversation("5511999990000", "conv-1", 500);
        assert_eq!(query.effective_limit(), MAX_HISTORY_LIMIT);

        query.limit = 0;
        assert_eq!(query.effective_limit(), 1);
    }

    #[test]
    fn query_pairs_skip_blank_filters() {
        let mut query = HistoryQuery::conversation("5511999990000", "conv-1", 10);
        query.before = Some("  ".to_string());
        query.after = Some("cursor-2".to_string());

        let pairs = query.query_pairs();

        assert!(pairs.contains(&("limit", "10".to_string())));
        assert!(pairs.contains(&("after", "cursor-2".to_string())));
        assert!(!pairs.iter().any(|(key, _)| *key == "before"));
    }

    #[test]
    fn receipt_extracts_provider_message_id() {
        let receipt = SendReceipt::from_provider(json!({
            "messaging_product": "whatsapp",
            "messages": [{"id": "wamid.HBgM"}]
        }));

        assert_eq!(receipt.message_id.as_deref(), Some("wamid.HBgM"));
    }

    #[test]
    fn outbound_text_requires_recipient_and_body() {
        assert!(OutboundText::new("", "hi").validate().is_err());
        assert!(OutboundText::new("5511999990000", "  ").validate().is_err());
        assert!(OutboundText::new("5511999990000", "hi").validate().is_ok());
    }
}
