use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;

use leadline_core::errors::FlowError;
use leadline_core::scheduling::TimeWindow;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar provider is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("calendar transport failure: {0}")]
    Transport(String),
    #[error("calendar provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode calendar response: {0}")]
    Decode(String),
}

impl From<CalendarError> for FlowError {
    fn from(error: CalendarError) -> Self {
        FlowError::upstream(error.to_string())
    }
}

/// Result of an OAuth2 refresh grant. Providers may omit a rotated refresh token.
#[derive(Clone, Debug)]
pub struct TokenGrant {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attendee {
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSpec {
    pub window: TimeWindow,
    /// IANA zone the event is presented in.
    pub timezone: String,
    pub summary: String,
    pub description: String,
    pub attendees: Vec<Attendee>,
    /// Idempotency key for the conference create request.
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedEvent {
    pub event_id: String,
    pub meeting_url: Option<String>,
    pub html_link: Option<String>,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn refresh_token(&self, refresh_token: &SecretString) -> Result<TokenGrant, CalendarError>;

    /// Busy intervals on the primary calendar intersecting `window`.
    async fn free_busy(
        &self,
        access_token: &SecretString,
        window: &TimeWindow,
    ) -> Result<Vec<TimeWindow>, CalendarError>;

    async fn create_event(
        &self,
        access_token: &SecretString,
        spec: &EventSpec,
    ) -> Result<CreatedEvent, CalendarError>;
}
