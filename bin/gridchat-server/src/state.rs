//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use gridchat_core::CompletionStreamer;

use crate::config::Config;

/// Read-only state shared by all requests.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Model-streaming client `/api/chat` forwards to.
    pub streamer: Arc<dyn CompletionStreamer>,
}
