//! HTTP API and live WebSocket feed
//!
//! Serves the monitor page, session stats, the device list, the message log
//! and its exports. `/ws` streams every new log entry as JSON.

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::device::ClassificationResult;
use crate::session::export::{self, ExportFormat};
use crate::session::{LogEntry, LogFilter, Session, SessionStats, TrackedDevice};

/// Shared state for API handlers
pub struct ApiState {
    pub session: Arc<Session>,
    /// Entries served by `/api/log` without a `limit`
    recent_limit: AtomicUsize,
}

impl ApiState {
    pub fn new(session: Arc<Session>, recent_limit: usize) -> Self {
        Self {
            session,
            recent_limit: AtomicUsize::new(recent_limit),
        }
    }

    pub fn set_recent_limit(&self, limit: usize) {
        self.recent_limit.store(limit, Ordering::Relaxed);
    }

    fn recent_limit(&self) -> usize {
        self.recent_limit.load(Ordering::Relaxed)
    }
}

/// API error response
#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl ApiError {
    fn internal(err: anyhow::Error) -> Self {
        warn!("API request failed: {:#}", err);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: format!("{:#}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
    /// Zero-based MIDI channel
    pub channel: Option<u8>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl LogQuery {
    fn filter(&self) -> LogFilter {
        LogFilter {
            channel: self.channel,
            kind: self.kind.clone().filter(|kind| !kind.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub total: usize,
    pub entries: Vec<Arc<LogEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyQuery {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResponse {
    #[serde(flatten)]
    pub result: ClassificationResult,
    pub is_target: bool,
}

/// Frames pushed over `/ws`
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum WsFrame {
    Hello { stats: SessionStats },
    Message { entry: Arc<LogEntry> },
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health_check))
        .route("/api/stats", get(get_stats))
        .route("/api/devices", get(list_devices))
        .route("/api/log", get(get_log).delete(clear_log))
        .route("/api/export.csv", get(export_csv))
        .route("/api/export.json", get(export_json))
        .route("/api/classify", get(classify))
        .route("/ws", get(live_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/monitor.html"))
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/stats - Session and log statistics
async fn get_stats(State(state): State<Arc<ApiState>>) -> Json<SessionStats> {
    Json(state.session.stats())
}

/// GET /api/devices - Known devices, most likely targets first
async fn list_devices(State(state): State<Arc<ApiState>>) -> Json<Vec<TrackedDevice>> {
    Json(state.session.devices())
}

/// GET /api/log?limit=N&channel=C&type=T - Most recent log entries, oldest first
async fn get_log(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LogQuery>,
) -> Json<LogResponse> {
    let limit = query.limit.unwrap_or_else(|| state.recent_limit());
    Json(LogResponse {
        total: state.session.log_len(),
        entries: state.session.recent_matching(&query.filter(), limit),
    })
}

/// DELETE /api/log - Clear the message log
async fn clear_log(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    let cleared = state.session.clear_log();
    Json(serde_json::json!({
        "ok": true,
        "cleared": cleared
    }))
}

async fn export_csv(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    export_response(&state, ExportFormat::Csv, "text/csv; charset=utf-8")
}

async fn export_json(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    export_response(&state, ExportFormat::Json, "application/json")
}

fn export_response(
    state: &ApiState,
    format: ExportFormat,
    content_type: &'static str,
) -> Result<Response, ApiError> {
    let body = export::render(&state.session.snapshot(), format).map_err(ApiError::internal)?;
    let disposition = format!(
        "attachment; filename=\"midi-log.{}\"",
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// GET /api/classify?name=&manufacturer= - Score host strings
async fn classify(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ClassifyQuery>,
) -> Json<ClassifyResponse> {
    let result = state
        .session
        .classify_strings(query.name.as_deref(), query.manufacturer.as_deref());
    Json(ClassifyResponse {
        result,
        is_target: result.is_target(state.session.settings().target_threshold),
    })
}

/// GET /ws - Live log entries
async fn live_ws(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn send_frame(socket: &mut WebSocket, frame: &WsFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize WebSocket frame: {}", e);
            true
        }
    }
}

/// Handle one WebSocket client
async fn handle_websocket(mut socket: WebSocket, state: Arc<ApiState>) {
    debug!("WebSocket client connected");

    // Subscribe first so no entry is lost between hello and the stream
    let mut rx = state.session.subscribe();

    let hello = WsFrame::Hello {
        stats: state.session.stats(),
    };
    if !send_frame(&mut socket, &hello).await {
        debug!("WebSocket client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(entry) => {
                        if !send_frame(&mut socket, &WsFrame::Message { entry }).await {
                            debug!("WebSocket client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {} messages", n);
                    }
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// Start the API server
pub async fn start_server(state: Arc<ApiState>, host: &str, port: u16) -> Result<()> {
    let router = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind web server on {}", addr))?;

    info!("Web monitor available at http://{}", addr);

    axum::serve(listener, router)
        .await
        .context("Web server error")?;

    Ok(())
}
