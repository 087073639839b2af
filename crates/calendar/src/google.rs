use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use leadline_core::config::CalendarConfig;
use leadline_core::scheduling::TimeWindow;

use crate::client::{CalendarClient, CalendarError, CreatedEvent, EventSpec, TokenGrant};

const PRIMARY_CALENDAR: &str = "primary";

/// Google Calendar v3 client. Requests are single attempts with the HTTP client's default timeout.
#[derive(Clone)]
pub struct GoogleCalendarClient {
    http: Client,
    api_base_url: String,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyPeriod>,
}

#[derive(Deserialize)]
struct BusyPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResponse {
    id: String,
    hangout_link: Option<String>,
    html_link: Option<String>,
    conference_data: Option<Value>,
}

impl GoogleCalendarClient {
    pub fn new(
        api_base_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: Option<String>,
        client_secret: Option<SecretString>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            client_id,
            client_secret,
        }
    }

    pub fn from_config(config: &CalendarConfig) -> Self {
        Self::new(
            config.api_base_url.clone(),
            config.token_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        )
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, CalendarError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "calendar.provider.rejected",
                operation,
                status = status.as_u16(),
                "calendar provider returned an error status"
            );
            return Err(CalendarError::Status { status: status.as_u16(), body });
        }
        response.json::<T>().await.map_err(|error| CalendarError::Decode(error.to_string()))
    }
}

fn transport(error: reqwest::Error) -> CalendarError {
    CalendarError::Transport(error.to_string())
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Prefers the `hangoutLink`, then the first video entry point of the conference data.
fn meeting_url(event: &EventResponse) -> Option<String> {
    event.hangout_link.clone().or_else(|| {
        event
            .conference_data
            .as_ref()?
            .get("entryPoints")?
            .as_array()?
            .iter()
            .find(|entry| entry.get("entryPointType").and_then(Value::as_str) == Some("video"))
            .and_then(|entry| entry.get("uri"))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn refresh_token(&self, refresh_token: &SecretString) -> Result<TokenGrant, CalendarError> {
        let client_id =
            self.client_id.as_deref().ok_or(CalendarError::NotConfigured("calendar.client_id"))?;
        let client_secret = self
            .client_secret
            .as_ref()
            .ok_or(CalendarError::NotConfigured("calendar.client_secret"))?;

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
                ("client_id", client_id),
                ("client_secret", client_secret.expose_secret()),
            ])
            .send()
            .await
            .map_err(transport)?;

        let token: RefreshResponse = Self::read_json("refresh_token", response).await?;
        if token.access_token.is_empty() {
            return Err(CalendarError::Decode("token endpoint returned empty access token".into()));
        }
        debug!(event_name = "calendar.token.refreshed", rotated = token.refresh_token.is_some());

        let expires_at = token
            .expires_in
            .and_then(|seconds| Utc::now().checked_add_signed(Duration::seconds(seconds)));
        Ok(TokenGrant {
            access_token: token.access_token.into(),
            refresh_token: token.refresh_token.filter(|value| !value.is_empty()).map(Into::into),
            expires_at,
        })
    }

    async fn free_busy(
        &self,
        access_token: &SecretString,
        window: &TimeWindow,
    ) -> Result<Vec<TimeWindow>, CalendarError> {
        let response = self
            .http
            .post(format!("{}/freeBusy", self.api_base_url))
            .bearer_auth(access_token.expose_secret())
            .json(&json!({
                "timeMin": rfc3339(window.start),
                "timeMax": rfc3339(window.end),
                "items": [{"id": PRIMARY_CALENDAR}],
            }))
            .send()
            .await
            .map_err(transport)?;

        let body: FreeBusyResponse = Self::read_json("free_busy", response).await?;
        let busy = body
            .calendars
            .get(PRIMARY_CALENDAR)
            .map(|calendar| {
                calendar
                    .busy
                    .iter()
                    .filter(|period| period.end > period.start)
                    .map(|period| TimeWindow { start: period.start, end: period.end })
                    .collect()
            })
            .unwrap_or_default();
        Ok(busy)
    }

    async fn create_event(
        &self,
        access_token: &SecretString,
        spec: &EventSpec,
    ) -> Result<CreatedEvent, CalendarError> {
        let attendees: Vec<Value> = spec
            .attendees
            .iter()
            .map(|attendee| match &attendee.display_name {
                Some(name) => json!({"email": attendee.email, "displayName": name}),
                None => json!({"email": attendee.email}),
            })
            .collect();

        let payload = json!({
            "summary": spec.summary,
            "description": spec.description,
            "start": {"dateTime": rfc3339(spec.window.start), "timeZone": spec.timezone},
            "end": {"dateTime": rfc3339(spec.window.end), "timeZone": spec.timezone},
            "attendees": attendees,
            "conferenceData": {
                "createRequest": {
                    "requestId": spec.request_id,
                    "conferenceSolutionKey": {"type": "hangoutsMeet"},
                },
            },
        });

        let response = self
            .http
            .post(format!("{}/calendars/{PRIMARY_CALENDAR}/events", self.api_base_url))
            .query(&[("conferenceDataVersion", "1"), ("sendUpdates", "all")])
            .bearer_auth(access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;

        let event: EventResponse = Self::read_json("create_event", response).await?;
        Ok(CreatedEvent {
            meeting_url: meeting_url(&event),
            html_link: event.html_link.clone(),
            event_id: event.id,
        })
    }
}
