//! Axum router construction.
//!
//! [`build`] assembles the application router:
//! - Middleware layers (CORS, per-request trace id)
//! - Optional Swagger UI / OpenAPI document (disable with `GRIDCHAT_ENABLE_SWAGGER=false`)
//! - `/api/ping`, `/api/echo` and the streaming `/api/chat` proxy

pub mod api;
pub mod chat;
pub mod doc;

use std::sync::Arc;

use axum::{Router, middleware};
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new().merge(api::router()).merge(chat::router());

    let mut app = Router::new().nest("/api", api_router);

    if state.config.enable_swagger {
        app = app.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()),
        );
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            trace::trace_middleware,
        ))
        .with_state(state)
}
