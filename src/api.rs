use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::ingest::scheduler::{run_gated, PassGate};
use crate::ingest::types::CanonicalRecord;
use crate::ingest::Orchestrator;
use crate::store::RecordQuery;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub gate: PassGate,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, gate: PassGate) -> Self {
        Self { orchestrator, gate }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tweets", get(list_tweets))
        .route("/api/tweets/topics", get(list_topics))
        .route("/api/tweets/fetch", post(trigger_fetch))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Common envelope: `{ success, message, data? }`.
#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

fn ok<T: Serialize>(message: String, data: T) -> Response {
    Json(Envelope {
        success: true,
        message,
        data: Some(data),
    })
    .into_response()
}

fn fail(status: StatusCode, message: &str, err: Option<&anyhow::Error>) -> Response {
    if let Some(e) = err {
        tracing::warn!(target: "api", error = ?e, "{message}");
    }
    (
        status,
        Json(Envelope::<()> {
            success: false,
            message: message.to_string(),
            data: None,
        }),
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK", "message": "Feed monitor is running" }))
}

#[derive(Debug, Deserialize)]
struct TweetsParams {
    page: Option<u32>,
    limit: Option<u32>,
    topic: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    current_page: u32,
    total_pages: u64,
    total_tweets: u64,
    has_next_page: bool,
    has_prev_page: bool,
}

#[derive(Serialize)]
struct TweetsData {
    tweets: Vec<CanonicalRecord>,
    pagination: Pagination,
}

async fn list_tweets(State(state): State<AppState>, Query(p): Query<TweetsParams>) -> Response {
    let query = RecordQuery {
        page: p.page.unwrap_or(1),
        limit: p.limit.unwrap_or(0),
        topic: p.topic,
    };
    match state.orchestrator.records().list(&query).await {
        Ok(page) => {
            let total_pages = page.total_pages();
            let pagination = Pagination {
                current_page: page.page,
                total_pages,
                total_tweets: page.total,
                has_next_page: (page.page as u64) < total_pages,
                has_prev_page: page.page > 1,
            };
            ok(
                format!("Successfully fetched {} tweets", page.records.len()),
                TweetsData {
                    tweets: page.records,
                    pagination,
                },
            )
        }
        Err(e) => fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error fetching tweets",
            Some(&e),
        ),
    }
}

async fn list_topics(State(state): State<AppState>) -> Response {
    match state.orchestrator.records().distinct_topics().await {
        Ok(topics) => ok(format!("Found {} unique topics", topics.len()), topics),
        Err(e) => fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error fetching topics",
            Some(&e),
        ),
    }
}

/// Runs a pass on demand; refuses while another pass is in flight.
async fn trigger_fetch(State(state): State<AppState>) -> Response {
    match run_gated(&state.orchestrator, &state.gate, "manual").await {
        Some(report) => ok(
            format!(
                "Fetched {} new tweets ({} accepted)",
                report.persisted.inserted,
                report.accepted.len()
            ),
            report.accepted,
        ),
        None => fail(StatusCode::CONFLICT, "A fetch is already in progress", None),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let fanout = state.orchestrator.fanout().clone();
    ws.on_upgrade(move |socket| fanout.serve_socket(socket))
}
