//! HTTP ingress for the notification host adapter.
//!
//! A host-side relay posts each raw notification to `POST /api/events`; the
//! gateway puts it on the live notification board and runs the event path.
//! The activity log is exposed read-only for UI polling.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::Bridge;
use crate::host::{LiveNotification, NotificationBoard};
use crate::message::{RawEvent, ReplyCapability};
use crate::utils::now_ms;

type HmacSha256 = Hmac<Sha256>;

/// Max event payload size: 8 MB (images are inlined as base64).
const MAX_EVENT_BODY: usize = 8 * 1024 * 1024;

const DEFAULT_ACTIVITY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct GatewayState {
    bridge: Bridge,
    board: Arc<NotificationBoard>,
    secret: Option<Arc<str>>,
}

impl GatewayState {
    pub fn new(bridge: Bridge, board: Arc<NotificationBoard>, secret: Option<String>) -> Self {
        Self {
            bridge,
            board,
            secret: secret.map(Arc::from),
        }
    }
}

/// Capability as posted by the host relay.
#[derive(Debug, Deserialize)]
pub struct CapabilityPayload {
    pub key: String,
    pub url: String,
}

/// Request body for POST /api/events.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub package_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sub_text: String,
    #[serde(default)]
    pub is_group: bool,
    /// Base64-encoded image bytes.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub capability: Option<CapabilityPayload>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl EventPayload {
    fn into_raw_event(self) -> Result<RawEvent, base64::DecodeError> {
        let image = self.image.map(|b64| BASE64.decode(b64.trim())).transpose()?;
        let timestamp_ms = self.timestamp.unwrap_or_else(now_ms);
        let capability = self.capability.map(|c| ReplyCapability {
            key: c.key,
            target: c.url,
            issued_at_ms: timestamp_ms,
        });
        Ok(RawEvent {
            package_id: self.package_id,
            title: self.title,
            text: self.text,
            sub_text: self.sub_text,
            is_group: self.is_group,
            image,
            capability,
            timestamp_ms,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub outcome: &'static str,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// Build the HTTP API router.
fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/events", post(events_handler))
        .route("/api/activity", get(activity_handler))
        .route("/api/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_EVENT_BODY))
        .with_state(state)
}

fn bad_request(msg: String) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: msg })).into_response()
}

/// POST /api/events: ingest one raw notification.
async fn events_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if body.len() > MAX_EVENT_BODY {
        warn!("event payload too large ({} bytes)", body.len());
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    if let Some(secret) = &state.secret {
        let signature = headers
            .get("X-Signature-256")
            .and_then(|v| v.to_str().ok());
        let Some(signature) = signature else {
            warn!("event rejected: missing signature header");
            return StatusCode::FORBIDDEN.into_response();
        };
        if !validate_signature(secret, signature, &body) {
            warn!("event rejected: invalid signature");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let payload: EventPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => return bad_request(format!("invalid event: {}", e)),
    };
    let event = match payload.into_raw_event() {
        Ok(ev) => ev,
        Err(e) => return bad_request(format!("invalid image encoding: {}", e)),
    };

    state.board.post(LiveNotification {
        package_id: event.package_id.clone(),
        title: event.title.clone(),
        sub_text: event.sub_text.clone(),
        is_group: event.is_group,
        capability: event.capability.clone(),
    });

    let outcome = state.bridge.on_event(&event);
    debug!("event from '{}': {}", event.title, outcome.as_str());
    (
        StatusCode::ACCEPTED,
        Json(EventResponse {
            outcome: outcome.as_str(),
        }),
    )
        .into_response()
}

/// GET /api/activity: most recent activity, newest last.
async fn activity_handler(
    State(state): State<GatewayState>,
    Query(query): Query<ActivityQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    Json(state.bridge.context().activity.recent(limit))
}

/// GET /api/health: health check endpoint.
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let queue = state.bridge.queue();
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "inFlight": queue.in_flight(),
        "pending": queue.pending(),
        "liveNotifications": state.board.len(),
    }))
}

/// Validate HMAC-SHA256 signature against a payload.
pub(crate) fn validate_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    // Accept raw hex or a "sha256=" prefix
    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

/// Serve the gateway until `shutdown` is cancelled.
pub async fn serve(
    host: &str,
    port: u16,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("gateway listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        error!("gateway server error: {}", e);
        return Err(e.into());
    }
    Ok(())
}
