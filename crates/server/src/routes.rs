//! HTTP surface. Handlers translate outcome envelopes into status codes; all logic lives in the
//! orchestration modules.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use leadline_core::config::WebhooksConfig;
use leadline_core::errors::{ErrorClass, FlowError};
use leadline_core::outcome::Outcome;
use leadline_db::DbPool;
use leadline_whatsapp::HistoryQuery;

use crate::auth::{refresh_api_key_cache, require_api_key, require_signature, SignatureGuard};
use crate::health;
use crate::state::AppState;

pub fn router(state: AppState, webhooks: &WebhooksConfig, db_pool: DbPool) -> Router {
    let message_guard = SignatureGuard::from_config("message_received", &webhooks.message_received);
    let events_guard = SignatureGuard::from_config("agent_events", &webhooks.agent_events);
    let commands_guard = SignatureGuard::from_config("commands", &webhooks.commands);
    info!(
        event_name = "system.routes.guards",
        message_received = message_guard.is_active(),
        agent_events = events_guard.is_active(),
        commands = commands_guard.is_active(),
        "webhook signature guards configured"
    );

    let inbound = Router::new()
        .route("/webhook/message-received", post(message_received))
        .route_layer(from_fn_with_state(message_guard, require_signature));

    let events = Router::new()
        .route("/events/webhook", post(agent_event))
        .route_layer(from_fn_with_state(events_guard, require_signature));

    let commands = Router::new()
        .route("/webhooks/reply", post(reply))
        .route("/webhooks/change-stage", post(change_stage))
        .route("/webhooks/check-availability", post(check_availability))
        .route("/webhooks/book-meeting", post(book_meeting))
        .route_layer(from_fn_with_state(commands_guard, require_signature));

    let keyed = Router::new()
        .route("/messages/{channel_id}", get(list_messages).post(send_message))
        .route("/admin/api-keys/refresh", post(refresh_api_keys))
        .route_layer(from_fn_with_state(state.api_keys.clone(), require_api_key));

    let health = health::router(db_pool, state.api_keys.clone());

    Router::new()
        .merge(inbound)
        .merge(events)
        .merge(commands)
        .merge(keyed)
        .with_state(state)
        .merge(health)
}

pub fn status_for(class: Option<ErrorClass>) -> StatusCode {
    match class {
        None => StatusCode::OK,
        Some(ErrorClass::Validation) => StatusCode::BAD_REQUEST,
        Some(ErrorClass::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorClass::Upstream) => StatusCode::BAD_GATEWAY,
    }
}

fn outcome_response<T: Serialize>(outcome: Outcome<T>) -> Response {
    (status_for(outcome.error_class), Json(outcome)).into_response()
}

#[derive(Debug, Default, Serialize)]
struct NoData {}

fn failure_response(error: &FlowError) -> Response {
    outcome_response(Outcome::<NoData>::failure(error))
}

fn parse_body(body: &Bytes) -> Result<Value, FlowError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|error| FlowError::validation(format!("invalid JSON body: {error}")))?;
    if !value.is_object() {
        return Err(FlowError::validation("request body must be a JSON object"));
    }
    Ok(value)
}

async fn message_received(State(state): State<AppState>, body: Bytes) -> Response {
    outcome_response(state.intake.handle_inbound_event(&body).await)
}

async fn agent_event(State(state): State<AppState>, body: Bytes) -> Response {
    match parse_body(&body) {
        Ok(body) => outcome_response(state.relay.agent_event(&body).await),
        Err(error) => failure_response(&error),
    }
}

async fn reply(State(state): State<AppState>, body: Bytes) -> Response {
    match parse_body(&body) {
        Ok(body) => outcome_response(state.relay.reply(&body).await),
        Err(error) => failure_response(&error),
    }
}

async fn change_stage(State(state): State<AppState>, body: Bytes) -> Response {
    match parse_body(&body) {
        Ok(body) => outcome_response(state.commands.change_stage(&body).await),
        Err(error) => failure_response(&error),
    }
}

async fn check_availability(State(state): State<AppState>, body: Bytes) -> Response {
    match parse_body(&body) {
        Ok(body) => outcome_response(state.scheduling.check_availability(&body).await),
        Err(error) => failure_response(&error),
    }
}

async fn book_meeting(State(state): State<AppState>, body: Bytes) -> Response {
    match parse_body(&body) {
        Ok(body) => outcome_response(state.scheduling.book_meeting(&body).await),
        Err(error) => failure_response(&error),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub phone_number: Option<String>,
    pub conversation_id: Option<String>,
    pub limit: Option<u32>,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl From<MessagesQuery> for HistoryQuery {
    fn from(query: MessagesQuery) -> Self {
        HistoryQuery {
            phone_number: query.phone_number,
            conversation_id: query.conversation_id,
            limit: query.limit.unwrap_or(20),
            before: query.before,
            after: query.after,
        }
    }
}

async fn list_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Response {
    match state.messaging.get_messages(&channel_id, &query.into()).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => failure_response(&error.into()),
    }
}

async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    body: Bytes,
) -> Response {
    match parse_body(&body) {
        Ok(body) => outcome_response(state.relay.send_on_channel(&channel_id, &body).await),
        Err(error) => failure_response(&error),
    }
}

#[derive(Debug, Default, Serialize)]
struct KeyRefreshData {
    #[serde(skip_serializing_if = "Option::is_none")]
    keys: Option<usize>,
}

async fn refresh_api_keys(State(state): State<AppState>) -> Response {
    match refresh_api_key_cache(&state.store, &state.api_keys).await {
        Ok(count) => {
            let data = KeyRefreshData { keys: Some(count) };
            outcome_response(Outcome::success("api key cache refreshed", data))
        }
        Err(error) => outcome_response(Outcome::<KeyRefreshData>::failure(&error.into())),
    }
}
