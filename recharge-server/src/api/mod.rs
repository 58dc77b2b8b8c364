//! HTTP API
//!
//! 对外只暴露两个端点：平台回调入口和健康检查。
//!
//! - `POST /callback/{platform}` — 平台异步回调，按路径段路由到
//!   对应适配器，响应体是适配器约定的 ack 文本
//! - `GET /health` — 健康检查

use crate::callback::CallbackError;
use crate::core::{Result, ServerError, ServerState};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/callback/{platform}", post(platform_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let queue_depth = state.queue.ready_len().unwrap_or(0);
    let in_flight = state.queue.list_reserved(100).map(|v| v.len()).unwrap_or(0);
    Json(json!({
        "status": "ok",
        "queue_depth": queue_depth,
        "in_flight": in_flight,
    }))
}

async fn platform_callback(
    State(state): State<ServerState>,
    Path(platform): Path<String>,
    body: Bytes,
) -> Result<String> {
    let (_, ack) = state
        .callbacks
        .handle(&platform, &body)
        .await
        .map_err(|e| match e {
            CallbackError::UnknownPlatform(p) => ServerError::UnknownPlatform(p),
            CallbackError::InvalidPayload(msg) => ServerError::Validation(msg),
            CallbackError::OrderNotFound(_) => ServerError::NotFound,
            CallbackError::Order(err) => ServerError::Internal(err.into()),
        })?;
    Ok(ack.to_string())
}
