//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the ledger node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                 | Description                               |
//! |--------|----------------------|-------------------------------------------|
//! | GET    | `/health`            | Liveness probe                            |
//! | GET    | `/status`            | Node status summary                       |
//! | POST   | `/invoke/:function`  | Run one ledger function as the caller     |
//! | GET    | `/ws`                | WebSocket stream of committed events      |
//!
//! The caller's credential travels in the `x-loyalty-identity` header. The
//! request body, when present, is the function's single JSON argument.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use loyalty_chaincode::{Chaincode, Function};
use loyalty_ledger::config::{LEDGER_VERSION, STORAGE_FORMAT_VERSION};
use loyalty_ledger::{ErrorKind, LedgerError, LedgerEvent};

use crate::metrics::SharedMetrics;

/// Header carrying the caller's credential.
pub const IDENTITY_HEADER: &str = "x-loyalty-identity";

// ---------------------------------------------------------------------------
// Shared State
// ---------------------------------------------------------------------------

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Node software version string.
    pub version: String,
    /// The ledger invocation surface.
    pub chaincode: Chaincode,
    /// Broadcast channel for committed ledger events.
    pub event_tx: broadcast::Sender<StreamEvent>,
    /// Prometheus metrics.
    pub metrics: SharedMetrics,
}

/// A committed ledger event as pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub tx_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum router with all API routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/invoke/:function", post(invoke_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// JSON error body returned for every rejected request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

/// A ledger error on its way to the client.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InsufficientBalance => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::LedgerInconsistent | ErrorKind::Storage => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.message,
            kind: self.kind,
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: Liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Response body for the `/status` endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    pub ledger_version: String,
    pub storage_format: u16,
    pub backend: String,
    pub admin: Option<String>,
    pub entries: usize,
    pub timestamp: String,
}

/// `GET /status`: Node status summary.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let admin = state.chaincode.settings()?.map(|s| s.admin);
    let backend = state.chaincode.backend();

    Ok(Json(StatusResponse {
        version: state.version.clone(),
        ledger_version: LEDGER_VERSION.to_string(),
        storage_format: STORAGE_FORMAT_VERSION,
        backend: backend.kind().to_string(),
        admin,
        entries: backend.entry_count(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// `POST /invoke/:function`: Run one ledger function.
///
/// The chaincode call is synchronous and may touch disk, so it runs on the
/// blocking pool. Events are broadcast only after the commit succeeded.
async fn invoke_handler(
    State(state): State<AppState>,
    Path(function): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<loyalty_chaincode::Response>, ApiError> {
    let started = Instant::now();
    let label = function
        .parse::<Function>()
        .map(|f| f.name())
        .unwrap_or("unknown");
    state.metrics.invocations_total.with_label_values(&[label]).inc();

    let credential = headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let args = match std::str::from_utf8(&body) {
        Ok(text) if text.trim().is_empty() => Vec::new(),
        Ok(text) => vec![text.to_string()],
        Err(_) => {
            return Err(record_failure(
                &state,
                LedgerError::InvalidArgument("request body is not UTF-8".into()),
            ))
        }
    };

    let chaincode = state.chaincode.clone();
    let result = tokio::task::spawn_blocking(move || chaincode.invoke(&credential, &function, &args))
        .await
        .map_err(|e| {
            tracing::error!("invocation task failed: {}", e);
            ApiError {
                kind: ErrorKind::Storage,
                message: "invocation task failed".into(),
            }
        })?;

    let response = result.map_err(|err| record_failure(&state, err))?;

    state
        .metrics
        .invocation_latency_seconds
        .observe(started.elapsed().as_secs_f64());
    state
        .metrics
        .ledger_entries
        .set(state.chaincode.backend().entry_count() as i64);

    for event in &response.events {
        let stream_event = StreamEvent {
            tx_id: response.tx_id,
            timestamp: response.timestamp,
            event: event.clone(),
        };
        let name = event.name();
        // No subscribers is not an error.
        if state.event_tx.send(stream_event).is_ok() {
            state.metrics.events_emitted_total.with_label_values(&[name]).inc();
        }
        tracing::debug!(tx_id = %response.tx_id, event = name, "event published");
    }

    Ok(Json(response))
}

fn record_failure(state: &AppState, err: LedgerError) -> ApiError {
    let kind = err.kind();
    state
        .metrics
        .invocation_failures_total
        .with_label_values(&[&kind.to_string()])
        .inc();
    if kind == ErrorKind::Conflict {
        state.metrics.commit_conflicts_total.inc();
    }
    ApiError::from(err)
}

/// `GET /ws`: WebSocket upgrade for committed ledger events.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Handle an individual WebSocket connection.
///
/// Subscribes to the broadcast channel and forwards each event as JSON text.
/// Client messages are ignored apart from close frames.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    tracing::debug!("websocket client connected");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!("failed to serialize event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("websocket client lagged, skipped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("websocket client disconnected");
}
