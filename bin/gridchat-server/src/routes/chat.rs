//! `POST /api/chat`: streams a generation back as length-prefixed frames.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use gridchat_core::CompletionRequest;
use serde_json::Value;
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

pub const FRAME_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(OpenApi)]
#[openapi(paths(chat))]
pub struct ChatApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

/// Forward a chat request to the model and stream the frames back.
///
/// The body is a sequence of frames: a 4-byte big-endian length followed by
/// a JSON object tagged `generation-start`, `generation-chunk`,
/// `generation-error` or `generation-finish`.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body = Value,
    responses(
        (status = 200, description = "Frame stream (application/octet-stream)"),
        (status = 400, description = "Malformed chat request", body = Value)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(request) = payload?;
    info!(
        model = %request.model,
        messages = request.messages.len(),
        tools = request.tools.len(),
        "chat request"
    );

    let frames = state.streamer.stream(request);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, FRAME_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(frames))
        .map_err(|e| ServerError::Internal(e.to_string()))
}
