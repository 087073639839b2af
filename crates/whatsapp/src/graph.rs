use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use leadline_core::config::WhatsAppConfig;

use crate::client::{
    HistoryQuery, MessagePage, MessagingClient, MessagingError, OutboundText, SendReceipt,
};

/// Graph API client: one bearer-authenticated attempt per call, bounded by the configured timeout.
#[derive(Clone)]
pub struct GraphMessagingClient {
    http: Client,
    base_url: String,
    access_token: SecretString,
}

impl GraphMessagingClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, MessagingError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| MessagingError::Transport(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// `None` when no access token is configured.
    pub fn from_config(config: &WhatsAppConfig) -> Result<Option<Self>, MessagingError> {
        let Some(token) = config
            .access_token
            .as_ref()
            .filter(|token| !token.expose_secret().trim().is_empty())
        else {
            return Ok(None);
        };
        Self::new(
            config.api_base_url.clone(),
            token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    fn messages_url(&self, channel_id: &str) -> Result<String, MessagingError> {
        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            return Err(MessagingError::InvalidRequest("channel id is required".into()));
        }
        Ok(format!("{}/{channel_id}/messages", self.base_url))
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, MessagingError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "whatsapp.provider.rejected",
                status = status.as_u16(),
                "messaging provider returned an error status"
            );
            return Err(MessagingError::Status { status: status.as_u16(), body });
        }
        response.json::<Value>().await.map_err(|error| MessagingError::Decode(error.to_string()))
    }
}

fn transport(error: reqwest::Error) -> MessagingError {
    if error.is_timeout() {
        MessagingError::Transport(format!("request timed out: {error}"))
    } else {
        MessagingError::Transport(error.to_string())
    }
}

#[async_trait]
impl MessagingClient for GraphMessagingClient {
    async fn get_messages(
        &self,
        channel_id: &str,
        query: &HistoryQuery,
    ) -> Result<MessagePage, MessagingError> {
        let url = self.messages_url(channel_id)?;
        debug!(event_name = "whatsapp.history.request", channel_id, limit = query.effective_limit());

        let response = self
            .http
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .query(&query.query_pairs())
            .send()
            .await
            .map_err(transport)?;

        let body = Self::read_json(response).await?;
        serde_json::from_value(body).map_err(|error| MessagingError::Decode(error.to_string()))
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutboundText,
    ) -> Result<SendReceipt, MessagingError> {
        message.validate()?;
        let url = self.messages_url(channel_id)?;

        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": message.to,
            "type": "text",
            "text": {
                "body": message.body,
                "preview_url": message.preview_url,
            },
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;

        let receipt = SendReceipt::from_provider(Self::read_json(response).await?);
        debug!(
            event_name = "whatsapp.message.sent",
            channel_id,
            message_id = receipt.message_id.as_deref().unwrap_or("unknown")
        );
        Ok(receipt)
    }
}
