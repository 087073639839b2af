//! Messaging provider access: conversation history and outbound text messages.

pub mod client;
pub mod graph;

pub use client::{
    DisabledMessagingClient, HistoryQuery, MessagePage, MessagingClient, MessagingError,
    OutboundText, SendReceipt, MAX_HISTORY_LIMIT,
};
pub use graph::GraphMessagingClient;

use std::sync::Arc;

use leadline_core::config::WhatsAppConfig;

/// Builds the provider client, or a disabled client when no access token is configured.
pub fn client_from_config(
    config: &WhatsAppConfig,
) -> Result<Arc<dyn MessagingClient>, MessagingError> {
    match GraphMessagingClient::from_config(config)? {
        Some(client) => Ok(Arc::new(client)),
        None => Ok(Arc::new(DisabledMessagingClient)),
    }
}
