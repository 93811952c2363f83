//! Liveness and echo endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use utoipa::{OpenApi, ToSchema};

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(ping, echo), components(schemas(PingResponse)))]
pub struct MiscApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(ping))
        .route("/echo", post(echo))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PingResponse {
    pub status: String,
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/api/ping",
    tag = "misc",
    responses(
        (status = 200, description = "Server is up", body = PingResponse)
    )
)]
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok".to_owned(),
        message: "Hello from gridchat!".to_owned(),
    })
}

/// Returns the posted JSON under `received`.
#[utoipa::path(
    post,
    path = "/api/echo",
    tag = "misc",
    request_body = Value,
    responses(
        (status = 200, description = "The request body, wrapped", body = Value),
        (status = 400, description = "Body is not JSON", body = Value)
    )
)]
pub async fn echo(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ServerError> {
    let Json(body) = payload?;
    Ok(Json(json!({ "received": body })))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
