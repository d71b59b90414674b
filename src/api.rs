use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;

use crate::error::AlphaError;
use crate::events::StreamEvent;
use crate::service::{CacheStatus, IngestReceipt, SignalService};
use crate::store::RawDocument;

/// Retry hint returned with 503 responses.
const RETRY_AFTER_SECS: u64 = 1;

pub fn router(service: Arc<SignalService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/recommend", post(recommend))
        .route("/ingest", post(ingest))
        .route("/articles/{ticker}", get(articles))
        .route("/history", get(history))
        .route("/ws/stream", get(ws_stream))
        .layer(CorsLayer::very_permissive())
        .with_state(service)
}

// ---- errors ----

pub struct ApiError(AlphaError);

impl From<AlphaError> for ApiError {
    fn from(e: AlphaError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AlphaError::IndexUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AlphaError::InvalidTicker(_) => StatusCode::BAD_REQUEST,
            AlphaError::Superseded(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = json!({ "error": self.0.label(), "message": self.0.to_string() });
        if status == StatusCode::SERVICE_UNAVAILABLE {
            body["retry_after_secs"] = json!(RETRY_AFTER_SECS);
        }
        let mut resp = (status, Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        resp
    }
}

// ---- handlers ----

#[derive(Serialize)]
struct Components {
    retrieval_ready: bool,
    agents_ready: bool,
}

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    document_count: usize,
    chunk_count: usize,
    index_version: u64,
    components: Components,
}

async fn health(State(svc): State<Arc<SignalService>>) -> Json<HealthOut> {
    let s = svc.status();
    Json(HealthOut {
        status: if s.running { "ok" } else { "stopped" },
        document_count: s.document_count,
        chunk_count: s.chunk_count,
        index_version: s.index_version,
        components: Components {
            retrieval_ready: s.retrieval_ready,
            agents_ready: s.agents_ready,
        },
    })
}

#[derive(Deserialize)]
struct RecommendReq {
    ticker: String,
    #[serde(default)]
    query: Option<String>,
}

async fn recommend(
    State(svc): State<Arc<SignalService>>,
    Json(body): Json<RecommendReq>,
) -> Result<Response, ApiError> {
    let out = svc.recommend(&body.ticker, body.query.as_deref()).await?;
    let mut resp = Json(out.recommendation).into_response();
    let cache = match out.cache {
        CacheStatus::Hit => "HIT",
        CacheStatus::Miss => "MISS",
    };
    resp.headers_mut()
        .insert("x-cache", HeaderValue::from_static(cache));
    Ok(resp)
}

async fn ingest(
    State(svc): State<Arc<SignalService>>,
    Json(raw): Json<RawDocument>,
) -> Result<Json<IngestReceipt>, ApiError> {
    Ok(Json(svc.ingest(raw).await?))
}

#[derive(Deserialize)]
struct LimitQ {
    #[serde(default)]
    limit: Option<usize>,
}

async fn articles(
    State(svc): State<Arc<SignalService>>,
    Path(ticker): Path<String>,
    Query(q): Query<LimitQ>,
) -> Result<Response, ApiError> {
    let limit = q.limit.unwrap_or(10).clamp(1, 100);
    let docs = svc.articles(&ticker, limit)?;
    Ok(Json(docs).into_response())
}

async fn history(State(svc): State<Arc<SignalService>>, Query(q): Query<LimitQ>) -> Response {
    let limit = q.limit.unwrap_or(20).clamp(1, 500);
    Json(svc.history(limit)).into_response()
}

// ---- websocket push ----

async fn ws_stream(ws: WebSocketUpgrade, State(svc): State<Arc<SignalService>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream_socket(socket, svc))
}

async fn handle_stream_socket(socket: WebSocket, svc: Arc<SignalService>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = svc.events().subscribe();

    // Current market snapshot first so the client can render immediately.
    let snapshot = svc.events().market_snapshot();
    if !snapshot.is_empty() {
        if let Ok(text) = serde_json::to_string(&StreamEvent::MarketUpdate(snapshot)) {
            if sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let Ok(text) = serde_json::to_string(&ev) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "ws client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}
