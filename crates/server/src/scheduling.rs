//! Calendar commands: availability checks and meeting booking for a lead's salesperson.

use std::sync::Arc;

use chrono::{Duration, Utc};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use leadline_calendar::{Attendee, CalendarClient, EventSpec};
use leadline_core::domain::business::Business;
use leadline_core::domain::connection::{
    OAuthConnection, GOOGLE_CALENDAR_PROVIDER, TOKEN_REFRESH_BUFFER_SECS,
};
use leadline_core::domain::lead::{Lead, LeadId};
use leadline_core::domain::EmployeeId;
use leadline_core::errors::FlowError;
use leadline_core::outcome::Outcome;
use leadline_core::scheduling::{
    is_free, parse_requested_start, suggest_slots, SlotQuery, TimeWindow, WorkingHours,
};
use leadline_db::RecordStore;

use crate::commands::required_id;

const MAX_DURATION_MINUTES: u64 = 24 * 60;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

struct MeetingRequest {
    lead_id: LeadId,
    date: String,
    duration: Duration,
    employee_id: Option<EmployeeId>,
}

impl MeetingRequest {
    fn parse(body: &Value, default_minutes: u32) -> Result<Self, FlowError> {
        let lead_id = LeadId(required_id(body, &["leadId", "lead_id"])?);
        let date = optional_text(body, "date")
            .ok_or_else(|| FlowError::validation("missing required field `date`"))?;

        let minutes = match body.get("duration").or_else(|| body.get("durationMinutes")) {
            None | Some(Value::Null) => u64::from(default_minutes),
            Some(value) => value
                .as_u64()
                .filter(|minutes| (1..=MAX_DURATION_MINUTES).contains(minutes))
                .ok_or_else(|| {
                    FlowError::validation("`duration` must be a positive number of minutes")
                })?,
        };

        let employee_id = match body.get("employeeId") {
            None | Some(Value::Null) => None,
            Some(_) => Some(EmployeeId(required_id(body, &["employeeId"])?)),
        };

        Ok(Self {
            lead_id,
            date,
            duration: Duration::minutes(minutes as i64),
            employee_id,
        })
    }
}

fn optional_text(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Everything a calendar call needs once the lead's salesperson is resolved.
struct CalendarAccess {
    lead: Lead,
    business: Business,
    access_token: SecretString,
}

pub struct SchedulingService {
    store: RecordStore,
    calendar: Arc<dyn CalendarClient>,
    default_hours: WorkingHours,
    default_duration_minutes: u32,
}

impl SchedulingService {
    pub fn new(
        store: RecordStore,
        calendar: Arc<dyn CalendarClient>,
        default_hours: WorkingHours,
        default_duration_minutes: u32,
    ) -> Self {
        Self { store, calendar, default_hours, default_duration_minutes }
    }

    pub async fn check_availability(&self, body: &Value) -> Outcome<AvailabilityData> {
        self.availability(body).await.unwrap_or_else(|error| {
            warn!(
                event_name = "scheduling.availability.failed",
                error_class = error.class().as_str(),
                error = %error,
                "availability check failed"
            );
            Outcome::failure(&error)
        })
    }

    pub async fn book_meeting(&self, body: &Value) -> Outcome<BookingData> {
        self.booking(body).await.unwrap_or_else(|error| {
            warn!(
                event_name = "scheduling.booking.failed",
                error_class = error.class().as_str(),
                error = %error,
                "meeting booking failed"
            );
            Outcome::failure(&error)
        })
    }

    async fn availability(&self, body: &Value) -> Result<Outcome<AvailabilityData>, FlowError> {
        let request = MeetingRequest::parse(body, self.default_duration_minutes)?;
        let hours = self.working_hours(body)?;
        let access = self.resolve(&request).await?;

        let tz = access.business.tz();
        let start = parse_requested_start(&request.date, tz)?;
        let window = TimeWindow::starting_at(start, request.duration)?;

        let busy = self.calendar.free_busy(&access.access_token, &window).await?;
        let mut data = AvailabilityData {
            is_available: Some(is_free(&window, &busy)),
            requested_start: Some(window.start.with_timezone(&tz).to_rfc3339()),
            requested_end: Some(window.end.with_timezone(&tz).to_rfc3339()),
            timezone: Some(tz.name().to_string()),
            suggestions: Vec::new(),
        };

        if data.is_available == Some(true) {
            return Ok(Outcome::success("requested slot is available", data));
        }

        let day = window.start.with_timezone(&tz).date_naive();
        if let Some(working_day) = hours.window_on(day, tz) {
            let day_busy = self.calendar.free_busy(&access.access_token, &working_day).await?;
            let query = SlotQuery { day, tz, hours, duration: request.duration, now: Utc::now() };
            data.suggestions =
                suggest_slots(&query, &day_busy).iter().map(|slot| slot.to_rfc3339()).collect();
        }

        info!(
            event_name = "scheduling.availability.busy",
            lead_id = %access.lead.id,
            suggestions = data.suggestions.len(),
            "requested slot is busy"
        );
        Ok(Outcome::success("requested slot is busy", data))
    }

    async fn booking(&self, body: &Value) -> Result<Outcome<BookingData>, FlowError> {
        let request = MeetingRequest::parse(body, self.default_duration_minutes)?;
        let access = self.resolve(&request).await?;

        let tz = access.business.tz();
        let start = parse_requested_start(&request.date, tz)?;
        let window = TimeWindow::starting_at(start, request.duration)?;

        let customer = access.lead.customer_name.clone();
        let spec = EventSpec {
            window,
            timezone: tz.name().to_string(),
            summary: optional_text(body, "title")
                .unwrap_or_else(|| format!("Meeting with {customer}")),
            description: optional_text(body, "description").unwrap_or_else(|| {
                format!("Meeting with {customer}, scheduled by {}.", access.business.name)
            }),
            attendees: access
                .lead
                .email_address()
                .map(|email| Attendee { email: email.to_string(), display_name: Some(customer) })
                .into_iter()
                .collect(),
            request_id: Uuid::new_v4().to_string(),
        };

        let event = self.calendar.create_event(&access.access_token, &spec).await?;
        info!(
            event_name = "scheduling.meeting.booked",
            lead_id = %access.lead.id,
            event_id = %event.event_id,
            "meeting booked"
        );

        let data = BookingData {
            event_id: Some(event.event_id),
            meeting_url: event.meeting_url,
            html_link: event.html_link,
            start: Some(window.start.with_timezone(&tz).to_rfc3339()),
            end: Some(window.end.with_timezone(&tz).to_rfc3339()),
        };
        Ok(Outcome::success("meeting booked", data))
    }

    fn working_hours(&self, body: &Value) -> Result<WorkingHours, FlowError> {
        match (optional_text(body, "workingHoursStart"), optional_text(body, "workingHoursEnd")) {
            (None, None) => Ok(self.default_hours),
            (start, end) => {
                let default_start = self.default_hours.start.format("%H:%M").to_string();
                let default_end = self.default_hours.end.format("%H:%M").to_string();
                WorkingHours::parse(
                    start.as_deref().unwrap_or(&default_start),
                    end.as_deref().unwrap_or(&default_end),
                )
            }
        }
    }

    /// Lead, then employee, then calendar connection, then a usable access token.
    async fn resolve(&self, request: &MeetingRequest) -> Result<CalendarAccess, FlowError> {
        let lead = self
            .store
            .leads
            .find_by_id(&request.lead_id)
            .await?
            .ok_or_else(|| FlowError::not_found("lead", request.lead_id.0.clone()))?;

        let employee_id = request
            .employee_id
            .clone()
            .or_else(|| lead.employee_id.clone())
            .ok_or_else(|| {
                FlowError::validation(format!("lead {} has no assigned employee", lead.id))
            })?;

        let (pipeline, connection) = tokio::join!(
            self.store.pipelines.find_by_id(&lead.pipeline_id),
            self.store.connections.find_for_employee(&employee_id, GOOGLE_CALENDAR_PROVIDER),
        );
        let pipeline = pipeline?
            .ok_or_else(|| FlowError::not_found("pipeline", lead.pipeline_id.0.clone()))?;
        let connection = connection?.ok_or_else(|| {
            FlowError::not_found("calendar connection", format!("employee {}", employee_id.0))
        })?;
        let business = self
            .store
            .businesses
            .find_by_id(&pipeline.business_id)
            .await?
            .ok_or_else(|| FlowError::not_found("business", pipeline.business_id.0.clone()))?;

        let access_token = self.usable_token(&connection).await?;
        Ok(CalendarAccess { lead, business, access_token })
    }

    /// Refreshes tokens expiring within the buffer and persists the rotated credentials.
    async fn usable_token(&self, connection: &OAuthConnection) -> Result<SecretString, FlowError> {
        if !connection.needs_refresh(Utc::now(), Duration::seconds(TOKEN_REFRESH_BUFFER_SECS)) {
            return Ok(connection.access_token.clone());
        }

        let refresh_token = connection.refresh_token.as_ref().ok_or_else(|| {
            FlowError::upstream(format!(
                "calendar token for connection {} expired and no refresh token is stored",
                connection.id
            ))
        })?;
        let grant = self.calendar.refresh_token(refresh_token).await?;

        if let Err(error) = self
            .store
            .connections
            .update_tokens(
                &connection.id,
                &grant.access_token,
                grant.refresh_token.as_ref(),
                grant.expires_at,
            )
            .await
        {
            warn!(
                event_name = "scheduling.token.persist_failed",
                connection_id = %connection.id,
                error = %error,
                "refreshed calendar token could not be stored"
            );
        } else {
            info!(
                event_name = "scheduling.token.refreshed",
                connection_id = %connection.id,
                "calendar token refreshed"
            );
        }

        Ok(grant.access_token)
    }
}
