//! gridchat-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables and `.env` (fails
//!    without an API key).
//! 2. Initialise structured tracing (JSON or human-readable).
//! 3. Build the OpenAI streaming client.
//! 4. Build the Axum router and serve with graceful shutdown.

use std::sync::Arc;

use gridchat_core::OpenAiClient;
use gridchat_server::config::Config;
use gridchat_server::state::AppState;
use gridchat_server::{routes, shutdown_signal};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env()?;

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: GRIDCHAT_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "gridchat-server starting");


    // ── 3. Model-streaming client ──────────────────────────────────────────────
    let streamer = OpenAiClient::new(cfg.openai_api_key.clone())
        .with_base_url(cfg.openai_base_url.clone())
        .with_reasoning_effort(cfg.reasoning_effort);
    info!(
        base_url = %streamer.base_url(),
        reasoning_effort = ?streamer.reasoning_effort(),
        "openai client ready"
    );

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        streamer: Arc::new(streamer),
    });

    // ── 4. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(cfg.bind_address()).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("gridchat-server stopped");
    Ok(())
}
