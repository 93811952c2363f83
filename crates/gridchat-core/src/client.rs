//! Streaming chat client for the `/api/chat` proxy.

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{self, Frame};
use crate::protocol::CompletionRequest;
use crate::session::{ChatEvent, ChatSession};
use crate::tool::Toolbox;

/// Proxy endpoint used when none is configured.
pub const DEFAULT_CHAT_URL: &str = "http://localhost:4000/api/chat";

/// Follow-up requests allowed in one turn before the client gives up.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// Sends a [`ChatSession`] to the proxy and runs the tool calls it answers with.
#[derive(Clone)]
pub struct ChatClient {
    url: String,
    http: reqwest::Client,
    toolbox: Toolbox,
}

impl ChatClient {
    pub fn new(url: impl Into<String>, toolbox: Toolbox) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            toolbox,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    /// Send a user message and run the turn to completion.
    ///
    /// `on_event` sees the session as it stands right after each event.
    /// Generation errors reported by the proxy are recorded in the session
    /// and do not fail the call; transport errors do.
    pub async fn send<F>(
        &self,
        session: &mut ChatSession,
        content: &str,
        mut on_event: F,
    ) -> Result<()>
    where
        F: FnMut(&ChatSession, ChatEvent) + Send,
    {
        let request = session.send_message(content)?;
        self.run(session, request, &mut on_event).await
    }

    /// Resend the last user message, discarding whatever followed it.
    pub async fn reload<F>(&self, session: &mut ChatSession, mut on_event: F) -> Result<()>
    where
        F: FnMut(&ChatSession, ChatEvent) + Send,
    {
        let request = session
            .reload()
            .ok_or_else(|| Error::InvalidState("nothing to retry".into()))?;
        self.run(session, request, &mut on_event).await
    }

    async fn run<F>(
        &self,
        session: &mut ChatSession,
        mut request: CompletionRequest,
        on_event: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&ChatSession, ChatEvent) + Send,
    {
        let mut rounds = 0;
        loop {
            if let Err(e) = self.generate(session, request, on_event).await {
                warn!(error = %e, url = %self.url, "chat request failed");
                session.fail(e.to_string());
                on_event(session, ChatEvent::Error(e.to_string()));
                return Err(e);
            }
            if session.error().is_some() {
                on_event(session, ChatEvent::TurnFinished);
                return Ok(());
            }

            for call in session.pending_tool_calls() {
                on_event(
                    session,
                    ChatEvent::ToolCallStarted {
                        id: call.id.clone(),
                        name: call.name.clone(),
                    },
                );
                let result = self.toolbox.invoke(&call.name, &call.arguments).await;
                session.resolve_tool_call(&call.id, result.clone());
                on_event(
                    session,
                    ChatEvent::ToolCallFinished {
                        id: call.id,
                        name: call.name,
                        result,
                    },
                );
            }

            match session.follow_up() {
                Some(next) if rounds < MAX_TOOL_ROUNDS => {
                    rounds += 1;
                    debug!(rounds, "sending tool results back to the model");
                    request = next;
                }
                Some(_) => {
                    let e = Error::InvalidState(format!(
                        "model kept calling tools after {MAX_TOOL_ROUNDS} rounds"
                    ));
                    session.fail(e.to_string());
                    on_event(session, ChatEvent::Error(e.to_string()));
                    return Err(e);
                }
                None => {
                    on_event(session, ChatEvent::TurnFinished);
                    return Ok(());
                }
            }
        }
    }

    /// Post one request and fold the response frames into `session`.
    async fn generate<F>(
        &self,
        session: &mut ChatSession,
        request: CompletionRequest,
        on_event: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&ChatSession, ChatEvent) + Send,
    {
        info!(url = %self.url, messages = request.messages.len(), "sending chat request");
        let response = self.http.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                status: status.as_u16(),
                message: server_error_message(&body),
            });
        }

        let mut frames = std::pin::pin!(frame::read_frames(response.bytes_stream()));
        let mut finished = false;

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            finished |= matches!(
                frame,
                Frame::GenerationFinish | Frame::GenerationError { .. }
            );
            if let Some(event) = session.apply_frame(frame) {
                on_event(session, event);
            }
        }

        if !finished {
            return Err(Error::Generation(
                "response ended before the generation finished".into(),
            ));
        }
        Ok(())
    }
}

/// Message of a `{"error": ...}` body, or the body itself.
fn server_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
