//! HTTP adapter over [`QuoteEngine`]. Handlers translate JSON to engine calls
//! and back; no conversation logic lives here.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::engine::{ConversationSummary, QuoteEngine, SessionStatus, TurnEvent};
use crate::error::EngineError;
use crate::metrics::Metrics;
use crate::quote::Quote;
use crate::retriever::ReadinessState;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QuoteEngine>,
}

impl AppState {
    pub fn new(engine: QuoteEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(QuoteEngine::from_config(cfg))
    }
}

/// Full router: API routes, `/metrics`, permissive CORS.
pub fn router(state: AppState) -> Router {
    let metrics = Metrics::init();
    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat/send", post(send))
        .route("/api/chat/status", get(status))
        .with_state(state)
        .merge(metrics.router())
        .layer(CorsLayer::very_permissive())
}

fn embedding_label(state: ReadinessState) -> &'static str {
    match state {
        ReadinessState::NotLoaded => "not_loaded",
        ReadinessState::Loading => "loading",
        ReadinessState::Ready => "ready",
        ReadinessState::Failed => "fallback",
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    timestamp: String,
    active_conversations: usize,
    embedding: &'static str,
    provider: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    Json(HealthResp {
        status: "OK",
        timestamp: now(),
        active_conversations: state.engine.active_conversations(),
        embedding: embedding_label(state.engine.readiness()),
        provider: state.engine.provider(),
    })
}

/// Thread ids arrive as numbers from some clients and strings from others.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum ThreadNum {
    Num(i64),
    Text(String),
}

impl std::fmt::Display for ThreadNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadNum::Num(n) => write!(f, "{n}"),
            ThreadNum::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendReq {
    user_id: String,
    thread_num: ThreadNum,
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendResp {
    content: String,
    event: TurnEvent,
    quote: Option<Quote>,
    #[serde(rename = "analysis_complete")]
    analysis_complete: bool,
    advice: Option<String>,
    keywords: Option<Vec<String>>,
    user_id: String,
    thread_num: ThreadNum,
    timestamp: String,
    status: &'static str,
    session_status: SessionStatus,
    #[serde(rename = "conversation_summary")]
    conversation_summary: ConversationSummary,
}

fn error_body(code: StatusCode, message: String) -> Response {
    (
        code,
        Json(json!({ "status": "error", "error": message, "timestamp": now() })),
    )
        .into_response()
}

async fn send(
    State(state): State<AppState>,
    body: Result<Json<SendReq>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rej) => return error_body(StatusCode::BAD_REQUEST, rej.body_text()),
    };

    let thread = req.thread_num.to_string();
    match state
        .engine
        .send_message(&req.user_id, &thread, &req.content)
        .await
    {
        Ok(turn) => Json(SendResp {
            content: turn.content,
            event: turn.event,
            quote: turn.quote,
            analysis_complete: turn.analysis_complete,
            advice: turn.advice,
            keywords: turn.keywords,
            user_id: req.user_id,
            thread_num: req.thread_num,
            timestamp: now(),
            status: "success",
            session_status: turn.status,
            conversation_summary: turn.summary,
        })
        .into_response(),
        Err(EngineError::Validation(e)) => {
            error_body(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusQuery {
    user_id: String,
    thread_num: String,
}

async fn status(State(state): State<AppState>, Query(q): Query<StatusQuery>) -> Response {
    let report = state.engine.get_status(&q.user_id, &q.thread_num).await;
    Json(json!({
        "status": report.status,
        "content": report.content,
        "turn_count": report.turn_count,
        "current_quote": report.current_quote,
        "conversation_summary": report.summary,
        "embedding": embedding_label(state.engine.readiness()),
        "userId": q.user_id,
        "threadNum": q.thread_num,
        "timestamp": now(),
    }))
    .into_response()
}
