use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use leadline_core::api_keys::ApiKeyCache;
use leadline_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    api_keys: Arc<ApiKeyCache>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub api_keys: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, api_keys: Arc<ApiKeyCache>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, api_keys })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        api_keys: HealthCheck {
            status: "ready",
            detail: format!("{} active keys cached", state.api_keys.len()),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}
