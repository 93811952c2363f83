//! View model of the chat panel: what to show, what to enable.

use std::sync::Arc;

use serde_json::Value;

use crate::grid::GridApi;
use crate::protocol::ToolResult;
use crate::session::{ChatMessage, ChatSession, ChatStatus, ToolCallRecord, ToolCallStatus};

pub const PLACEHOLDER: &str =
    "Ask me to pivot, group, filter, or format the grid. I'll apply the changes for you.";

/// Shown in place of an assistant message that has no text yet.
pub const WORKING: &str = "I'm working on your request.";

pub const RETRY_LABEL: &str = "Try again";

/// Input state of the panel. Conversation state lives in [`ChatSession`].
#[derive(Default)]
pub struct ChatPanel {
    schema: Option<Value>,
    grid: Option<Arc<dyn GridApi>>,
    input: String,
}

impl ChatPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_schema(&mut self, schema: Value) {
        self.schema = Some(schema);
    }

    pub fn set_grid(&mut self, grid: Arc<dyn GridApi>) {
        self.grid = Some(grid);
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Both the tool schema and the grid are known.
    pub fn is_ready(&self) -> bool {
        self.schema.is_some() && self.grid.is_some()
    }

    pub fn composer_enabled(&self, session: &ChatSession) -> bool {
        self.is_ready() && !session.is_sending()
    }

    pub fn send_enabled(&self, session: &ChatSession) -> bool {
        self.composer_enabled(session) && !self.input.trim().is_empty()
    }

    /// Take the trimmed input for sending, clearing the composer.
    ///
    /// Returns `None` when sending is not allowed right now.
    pub fn commit(&mut self, session: &ChatSession) -> Option<String> {
        if !self.send_enabled(session) {
            return None;
        }
        let value = self.input.trim().to_owned();
        self.input.clear();
        Some(value)
    }
}

pub fn placeholder(session: &ChatSession) -> Option<&'static str> {
    session.messages().is_empty().then_some(PLACEHOLDER)
}

pub fn show_stop(session: &ChatSession) -> bool {
    session.is_receiving() || session.is_running_tool_calls()
}

pub fn status_line(session: &ChatSession) -> &'static str {
    match session.status() {
        ChatStatus::RunningToolCalls => "Applying changes to the grid...",
        ChatStatus::Sending | ChatStatus::Receiving => "Thinking...",
        ChatStatus::Idle => "Ready for your next request.",
    }
}

/// Error text and the label of its retry action.
pub fn error_banner(session: &ChatSession) -> Option<(&str, &'static str)> {
    session.error().map(|e| (e, RETRY_LABEL))
}

/// Strings verbatim, anything else pretty-printed JSON.
pub fn render_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub fn tool_call_label(call: &ToolCallRecord) -> String {
    match &call.status {
        ToolCallStatus::Pending => format!("Running {}...", call.name),
        ToolCallStatus::Done(ToolResult::Fulfilled { .. }) => format!("Applied {}", call.name),
        ToolCallStatus::Done(ToolResult::Rejected { .. }) => format!("Failed {}", call.name),
    }
}

/// One rendered chat bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub avatar: &'static str,
    pub body: String,
    pub tool_calls: Vec<String>,
}

pub fn render_message(message: &ChatMessage) -> RenderedMessage {
    match message {
        ChatMessage::User { content } => RenderedMessage {
            avatar: "You",
            body: content.clone(),
            tool_calls: Vec::new(),
        },
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => RenderedMessage {
            avatar: "AI",
            body: if content.is_empty() {
                WORKING.to_owned()
            } else {
                content.clone()
            },
            tool_calls: tool_calls.iter().map(tool_call_label).collect(),
        },
        ChatMessage::Error { content } => RenderedMessage {
            avatar: "!",
            body: content.clone(),
            tool_calls: Vec::new(),
        },
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
