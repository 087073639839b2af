//! Fixtures shared by the orchestration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::Value;

use leadline_core::domain::business::{Business, BusinessId};
use leadline_core::domain::lead::{Lead, LeadId, NewLead};
use leadline_core::domain::pipeline::{Pipeline, PipelineId, PipelineStage, StageId};
use leadline_db::repositories::InMemoryCrmStore;
use leadline_whatsapp::{
    HistoryQuery, MessagePage, MessagingClient, MessagingError, OutboundText, SendReceipt,
};

pub const CHANNEL: &str = "chan-1";
pub const DISABLED_CHANNEL: &str = "chan-off";

pub fn business() -> Business {
    Business {
        id: BusinessId("biz-1".to_string()),
        name: "Clinica Aurora".to_string(),
        timezone: "America/Sao_Paulo".to_string(),
    }
}

pub fn pipeline() -> Pipeline {
    Pipeline {
        id: PipelineId("pipe-1".to_string()),
        business_id: BusinessId("biz-1".to_string()),
        name: "Inbound".to_string(),
        whatsapp_phone_number_id: Some(CHANNEL.to_string()),
        whatsapp_enabled: true,
    }
}

fn stage(pipeline_id: &str, id: &str, position: i64, webhook_url: Option<String>) -> PipelineStage {
    PipelineStage {
        id: StageId(id.to_string()),
        pipeline_id: PipelineId(pipeline_id.to_string()),
        name: format!("Stage {position}"),
        position,
        is_input: position == 1,
        webhook_url,
    }
}

pub fn input_stage(webhook_url: Option<String>) -> PipelineStage {
    stage("pipe-1", "stage-1", 1, webhook_url)
}

pub fn open_lead(id: LeadId, phone: &str, now: DateTime<Utc>) -> Lead {
    NewLead {
        pipeline_id: PipelineId("pipe-1".to_string()),
        stage_id: StageId("stage-1".to_string()),
        customer_name: "Maria".to_string(),
        phone_number: phone.to_string(),
        email: Some("maria@example.com".to_string()),
        conversation_id: Some("conv-1".to_string()),
    }
    .into_lead(id, now)
}

/// One business, an enabled four-stage pipeline on [`CHANNEL`], a disabled pipeline on
/// [`DISABLED_CHANNEL`] and a second enabled pipeline whose stage belongs elsewhere.
/// `webhook_url` is attached to stage 1 and stage 3.
pub async fn seeded_store(webhook_url: Option<String>) -> Arc<InMemoryCrmStore> {
    populate(InMemoryCrmStore::default(), webhook_url).await
}

pub async fn populate(store: InMemoryCrmStore, webhook_url: Option<String>) -> Arc<InMemoryCrmStore> {
    store.add_business(business()).await;
    store.add_pipeline(pipeline()).await;
    store
        .add_pipeline(Pipeline {
            id: PipelineId("pipe-off".to_string()),
            whatsapp_phone_number_id: Some(DISABLED_CHANNEL.to_string()),
            whatsapp_enabled: false,
            ..pipeline()
        })
        .await;
    store
        .add_pipeline(Pipeline {
            id: PipelineId("pipe-2".to_string()),
            whatsapp_phone_number_id: Some("chan-2".to_string()),
            ..pipeline()
        })
        .await;

    store.add_stage(input_stage(webhook_url.clone())).await;
    store.add_stage(stage("pipe-1", "stage-2", 2, None)).await;
    store.add_stage(stage("pipe-1", "stage-3", 3, webhook_url)).await;
    store.add_stage(stage("pipe-1", "stage-4", 4, None)).await;
    store.add_stage(stage("pipe-off", "stage-off-1", 1, None)).await;
    store.add_stage(stage("pipe-2", "stage-other-1", 1, None)).await;
    Arc::new(store)
}

/// Local webhook target: `/hook` records JSON bodies after `delay`, `/fail` answers 500.
pub struct Sink {
    base: String,
    received: Arc<Mutex<Vec<Value>>>,
}

impl Sink {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().expect("sink lock").clone()
    }
}

#[derive(Clone)]
struct SinkState {
    delay: Duration,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn record(State(state): State<SinkState>, Json(body): Json<Value>) -> StatusCode {
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    state.received.lock().expect("sink lock").push(body);
    StatusCode::OK
}

async fn fail() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

pub async fn spawn_sink(delay: Duration) -> Sink {
    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/hook", post(record))
        .route("/fail", post(fail))
        .with_state(SinkState { delay, received: Arc::clone(&received) });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind sink");
    let address = listener.local_addr().expect("sink address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("sink server");
    });
    Sink { base: format!("http://{address}"), received }
}

/// Messaging double returning canned history and recording sends.
#[derive(Default)]
pub struct RecordingMessaging {
    history: Vec<Value>,
    fail_history: bool,
    history_calls: AtomicUsize,
    last_limit: Mutex<Option<u32>>,
    sent: Mutex<Vec<(String, OutboundText)>>,
}

impl RecordingMessaging {
    pub fn with_history(history: Vec<Value>) -> Self {
        Self { history, ..Self::default() }
    }

    pub fn failing_history() -> Self {
        Self { fail_history: true, ..Self::default() }
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn last_history_limit(&self) -> Option<u32> {
        *self.last_limit.lock().expect("limit lock")
    }

    pub fn sent(&self) -> Vec<(String, OutboundText)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl MessagingClient for RecordingMessaging {
    async fn get_messages(
        &self,
        _channel_id: &str,
        query: &HistoryQuery,
    ) -> Result<MessagePage, MessagingError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_limit.lock().expect("limit lock") = Some(query.effective_limit());
        if self.fail_history {
            return Err(MessagingError::Transport("connection refused".to_string()));
        }
        Ok(MessagePage { data: self.history.clone(), paging: None })
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutboundText,
    ) -> Result<SendReceipt, MessagingError> {
        message.validate()?;
        self.sent.lock().expect("sent lock").push((channel_id.to_string(), message.clone()));
        Ok(SendReceipt::from_provider(serde_json::json!({"messages": [{"id": "wamid.test"}]})))
    }
}
