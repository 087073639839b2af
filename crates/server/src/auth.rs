//! Request guards: HMAC signatures on webhook routes and API keys on operator routes.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use leadline_core::api_keys::ApiKeyCache;
use leadline_core::config::WebhookRouteConfig;
use leadline_core::signature::{HmacVerifier, SignatureVerifier};
use leadline_db::{RecordStore, RepositoryError};

pub const API_KEY_HEADER: &str = "x-api-key";
const MAX_SIGNED_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

/// Signature check for one route group. Without a secret the group is unguarded.
#[derive(Clone)]
pub struct SignatureGuard {
    route: &'static str,
    verifier: Arc<HmacVerifier>,
    secret: Option<SecretString>,
}

impl SignatureGuard {
    pub fn from_config(route: &'static str, config: &WebhookRouteConfig) -> Self {
        Self {
            route,
            verifier: Arc::new(HmacVerifier::new(config.scheme())),
            secret: config.active_secret().cloned(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.secret.is_some()
    }
}

pub async fn require_signature(
    State(guard): State<SignatureGuard>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = guard.secret.as_ref() else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_SIGNED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"),
    };

    let header = guard.verifier.scheme().header.as_str();
    let Some(signature) = parts.headers.get(header).and_then(|value| value.to_str().ok()) else {
        warn!(event_name = "auth.signature.missing", route = guard.route, header);
        let message = format!("missing signature header `{header}`");
        return error_response(StatusCode::UNAUTHORIZED, message);
    };

    if !guard.verifier.verify(&bytes, signature, secret.expose_secret().as_bytes()) {
        warn!(event_name = "auth.signature.invalid", route = guard.route);
        return error_response(StatusCode::UNAUTHORIZED, "invalid signature");
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Admits requests whose `x-api-key` is in the cache and attaches the matching entry.
pub async fn require_api_key(
    State(cache): State<Arc<ApiKeyCache>>,
    mut request: Request,
    next: Next,
) -> Response {
    let entry = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .and_then(|key| cache.lookup(key));

    match entry {
        Some(entry) => {
            request.extensions_mut().insert(entry);
            next.run(request).await
        }
        None => {
            warn!(event_name = "auth.api_key.rejected", path = %request.uri().path());
            error_response(StatusCode::UNAUTHORIZED, "invalid or missing API key")
        }
    }
}

/// Replaces the cached key set with the store's active keys.
pub async fn refresh_api_key_cache(
    store: &RecordStore,
    cache: &ApiKeyCache,
) -> Result<usize, RepositoryError> {
    let entries = store.api_keys.list_active().await?;
    let count = cache.replace(entries);
    info!(event_name = "auth.api_keys.refreshed", keys = count, "api key cache refreshed");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::extract::Extension;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::post;
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use leadline_core::api_keys::{ApiKeyCache, ApiKeyEntry};
    use leadline_core::config::AppConfig;
    use leadline_core::signature::HmacVerifier;

    use super::{require_api_key, require_signature, SignatureGuard, API_KEY_HEADER};

    const PAYLOAD: &str = r#"{"phoneNumberId":"chan-1"}"#;

    fn signed_router(secret: Option<&str>) -> Router {
        let mut config = AppConfig::default().webhooks.message_received;
        config.secret = secret.map(|value| value.to_string().into());
        let guard = SignatureGuard::from_config("message_received", &config);
        Router::new()
            .route("/hook", post(|body: String| async move { body }))
            .route_layer(from_fn_with_state(guard, require_signature))
    }

    fn signature(secret: &str, payload: &str) -> String {
        let scheme = AppConfig::default().webhooks.message_received.scheme();
        HmacVerifier::new(scheme).sign(payload.as_bytes(), secret.as_bytes()).expect("signature")
    }

    fn post_hook(signature: Option<String>, payload: &str) -> Request<Body> {
        let mut builder = Request::post("/hook");
        if let Some(signature) = signature {
            builder = builder.header("x-hub-signature-256", signature);
        }
        builder.body(Body::from(payload.to_string())).expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn unset_secret_leaves_route_unguarded() {
        let response =
            signed_router(None).oneshot(post_hook(None, PAYLOAD)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_signature_passes_body_through_unchanged() {
        let response = signed_router(Some("s3cret"))
            .oneshot(post_hook(Some(signature("s3cret", PAYLOAD)), PAYLOAD))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(bytes, PAYLOAD.as_bytes());
    }

    #[tokio::test]
    async fn tampered_or_missing_signature_is_unauthorized() {
        let tampered = signed_router(Some("s3cret"))
            .oneshot(post_hook(Some(signature("s3cret", PAYLOAD)), r#"{"phoneNumberId":"x"}"#))
            .await
            .expect("response");
        let missing =
            signed_router(Some("s3cret")).oneshot(post_hook(None, PAYLOAD)).await.expect("response");

        assert_eq!(tampered.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(tampered).await["error"], "invalid signature");
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert!(body_json(missing).await["error"].as_str().expect("error").contains("missing"));
    }

    fn keyed_router(cache: Arc<ApiKeyCache>) -> Router {
        Router::new()
            .route(
                "/admin",
                post(|Extension(entry): Extension<ApiKeyEntry>| async move { entry.user_id }),
            )
            .route_layer(from_fn_with_state(cache, require_api_key))
    }

    #[tokio::test]
    async fn api_key_guard_admits_cached_keys_only() {
        let cache = Arc::new(ApiKeyCache::new());
        cache.replace(vec![ApiKeyEntry {
            key: "lk_live_1".to_string(),
            user_id: "user-9".to_string(),
            label: None,
        }]);

        let admitted = keyed_router(Arc::clone(&cache))
            .oneshot(
                Request::post("/admin")
                    .header(API_KEY_HEADER, "lk_live_1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let rejected = keyed_router(Arc::clone(&cache))
            .oneshot(
                Request::post("/admin")
                    .header(API_KEY_HEADER, "lk_other")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(admitted.status(), StatusCode::OK);
        let user = to_bytes(admitted.into_body(), usize::MAX).await.expect("body");
        assert_eq!(user, "user-9".as_bytes());
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    }
}
