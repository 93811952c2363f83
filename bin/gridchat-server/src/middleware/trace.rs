use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, Limited};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::ServerError;
use crate::state::AppState;

pub static X_TRACE_ID: &str = "x-trace-id";

/// JSON request bodies up to this size are logged verbatim at debug level.
/// Anything larger, or of unknown length, is passed through unread.
const MAX_LOGGED_BODY: usize = 1024;

/// Tags each request with a trace id and logs it inside a request span.
///
/// Response bodies pass through untouched; the log line is written once the
/// response head is ready, so streamed bodies are not held back.
pub async fn trace_middleware(
    State(_state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let (parts, body) = req.into_parts();
        let mut response = match log_request_body(&parts.headers, body).await {
            Ok(body) => {
                let mut req = Request::from_parts(parts, body);
                if let Some(value) = &trace_header {
                    req.headers_mut().insert(X_TRACE_ID, value.clone());
                }
                next.run(req).await
            }
            Err(e) => e.into_response(),
        };
        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response started"
        );
        response
    }
    .instrument(span)
    .await
}

async fn log_request_body(headers: &HeaderMap, body: Body) -> Result<Body, ServerError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let small_json = content_type.contains("application/json")
        && declared_len.is_some_and(|len| len <= MAX_LOGGED_BODY);
    if !small_json {
        if let Some(size) = declared_len.filter(|&len| len > 0) {
            debug!(content_type, size, "request body skipped");
        }
        return Ok(body);
    }

    let bytes = match Limited::new(body, MAX_LOGGED_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Err(ServerError::BadRequest(format!(
                "failed to read request body: {e}"
            )));
        }
    };

    if let Ok(text) = std::str::from_utf8(&bytes) {
        debug!(body = text, "request body");
    }
    Ok(Body::from(bytes))
}
