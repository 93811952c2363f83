//! Client-side chat state.
//!
//! [`ChatSession`] is a plain state machine: it turns user input into
//! [`CompletionRequest`]s and folds the frames of each response into the
//! message list. It performs no I/O; [`crate::client::ChatClient`] drives it.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::protocol::{
    CompletionChunk, CompletionRequest, FUNCTION_CALL, FunctionCall, Message, ToolCall,
    ToolResult, ToolSpec,
};

/// Reason recorded for tool calls that never ran.
const NOT_RUN: &str = "tool call was stopped before it completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ChatStatus {
    Idle,
    Sending,
    Receiving,
    RunningToolCalls,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallStatus {
    Pending,
    Done(ToolResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    /// Raw JSON argument text as streamed by the model.
    pub arguments: String,
    pub status: ToolCallStatus,
}

impl ToolCallRecord {
    pub fn is_pending(&self) -> bool {
        self.status == ToolCallStatus::Pending
    }

    pub fn result(&self) -> Option<&ToolResult> {
        match &self.status {
            ToolCallStatus::Done(result) => Some(result),
            ToolCallStatus::Pending => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User {
        content: String,
    },
    Assistant {
        content: String,
        tool_calls: Vec<ToolCallRecord>,
    },
    Error {
        content: String,
    },
}

/// Something the UI may want to render while a turn progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    GenerationStarted,
    ContentDelta(String),
    GenerationFinished,
    ToolCallStarted { id: String, name: String },
    ToolCallFinished { id: String, name: String, result: ToolResult },
    Error(String),
    TurnFinished,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    model: String,
    system: String,
    tools: Vec<ToolSpec>,
    messages: Vec<ChatMessage>,
    status: ChatStatus,
    error: Option<String>,
    /// `true` while an assistant message is open for streaming.
    streaming: bool,
    /// Streamed tool-call index → position in the open message's tool calls.
    tool_slots: HashMap<u32, usize>,
}

impl ChatSession {
    pub fn new(model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            tools: Vec::new(),
            messages: Vec::new(),
            status: ChatStatus::Idle,
            error: None,
            streaming: false,
            tool_slots: HashMap::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_sending(&self) -> bool {
        self.status == ChatStatus::Sending
    }

    pub fn is_receiving(&self) -> bool {
        self.status == ChatStatus::Receiving
    }

    pub fn is_running_tool_calls(&self) -> bool {
        self.status == ChatStatus::RunningToolCalls
    }

    pub fn is_busy(&self) -> bool {
        self.status != ChatStatus::Idle
    }

    /// `true` between `generation-start` and the end of that generation.
    pub fn is_generating(&self) -> bool {
        self.streaming
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    /// Append a user message and return the request that sends it.
    pub fn send_message(&mut self, content: impl Into<String>) -> Result<CompletionRequest> {
        if self.is_busy() {
            return Err(Error::InvalidState("a response is still in progress".into()));
        }
        self.messages.push(ChatMessage::User {
            content: content.into(),
        });
        self.error = None;
        self.status = ChatStatus::Sending;
        Ok(self.request())
    }

    /// Request for the current conversation. Error messages are never sent.
    pub fn request(&self) -> CompletionRequest {
        let mut messages = Vec::with_capacity(self.messages.len());
        for message in &self.messages {
            match message {
                ChatMessage::User { content } => messages.push(Message::User {
                    content: content.clone(),
                }),
                ChatMessage::Assistant {
                    content,
                    tool_calls,
                } => {
                    if content.is_empty() && tool_calls.is_empty() {
                        continue;
                    }
                    messages.push(Message::Assistant {
                        content: (!content.is_empty()).then(|| content.clone()),
                        tool_calls: tool_calls
                            .iter()
                            .map(|c| ToolCall {
                                id: c.id.clone(),
                                kind: FUNCTION_CALL.to_owned(),
                                function: FunctionCall {
                                    name: c.name.clone(),
                                    arguments: c.arguments.clone(),
                                },
                            })
                            .collect(),
                    });
                    for call in tool_calls {
                        let content = call
                            .result()
                            .cloned()
                            .unwrap_or_else(|| ToolResult::rejected(NOT_RUN));
                        messages.push(Message::Tool {
                            content,
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                        });
                    }
                }
                ChatMessage::Error { .. } => {}
            }
        }

        CompletionRequest {
            model: self.model.clone(),
            system: self.system.clone(),
            messages,
            tools: self.tools.clone(),
            tool_choice: None,
            response_format: None,
        }
    }

    /// Next request once every tool call of the last answer has settled.
    ///
    /// Returns `None` (and goes idle) when the model answered without tools.
    pub fn follow_up(&mut self) -> Option<CompletionRequest> {
        let ready = match self.messages.last() {
            Some(ChatMessage::Assistant { tool_calls, .. }) => {
                !tool_calls.is_empty() && tool_calls.iter().all(|c| !c.is_pending())
            }
            _ => false,
        };

        if ready && self.error.is_none() {
            self.status = ChatStatus::Sending;
            Some(self.request())
        } else {
            self.status = ChatStatus::Idle;
            None
        }
    }

    /// Drop everything after the last user message and resend it.
    pub fn reload(&mut self) -> Option<CompletionRequest> {
        if self.is_busy() {
            return None;
        }
        let last_user = self
            .messages
            .iter()
            .rposition(|m| matches!(m, ChatMessage::User { .. }))?;
        self.messages.truncate(last_user + 1);
        self.error = None;
        self.status = ChatStatus::Sending;
        Some(self.request())
    }

    // ── Streaming ────────────────────────────────────────────────────────────

    /// Fold one response frame into the conversation.
    pub fn apply_frame(&mut self, frame: Frame) -> Option<ChatEvent> {
        match frame {
            Frame::GenerationStart => {
                self.open_assistant();
                Some(ChatEvent::GenerationStarted)
            }
            Frame::GenerationChunk { chunk } => {
                if !self.streaming {
                    self.open_assistant();
                }
                self.apply_chunk(chunk).map(ChatEvent::ContentDelta)
            }
            Frame::GenerationError { error } => {
                self.fail(error.clone());
                Some(ChatEvent::Error(error))
            }
            Frame::GenerationFinish => {
                self.streaming = false;
                self.tool_slots.clear();
                self.status = if self.pending_tool_calls().is_empty() {
                    ChatStatus::Idle
                } else {
                    ChatStatus::RunningToolCalls
                };
                Some(ChatEvent::GenerationFinished)
            }
        }
    }

    fn open_assistant(&mut self) {
        self.messages.push(ChatMessage::Assistant {
            content: String::new(),
            tool_calls: Vec::new(),
        });
        self.streaming = true;
        self.tool_slots.clear();
        self.status = ChatStatus::Receiving;
    }

    /// Returns the text appended by `chunk`, if any.
    fn apply_chunk(&mut self, chunk: CompletionChunk) -> Option<String> {
        let Some(ChatMessage::Assistant {
            content,
            tool_calls,
        }) = self.messages.last_mut()
        else {
            return None;
        };

        let mut appended = String::new();
        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            if let Some(text) = choice.delta.content {
                appended.push_str(&text);
            }

            for delta in choice.delta.tool_calls {
                let slot = *self.tool_slots.entry(delta.index).or_insert_with(|| {
                    tool_calls.push(ToolCallRecord {
                        id: String::new(),
                        name: String::new(),
                        arguments: String::new(),
                        status: ToolCallStatus::Pending,
                    });
                    tool_calls.len() - 1
                });
                let record = &mut tool_calls[slot];
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    record.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        record.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        record.arguments.push_str(&arguments);
                    }
                }
            }
        }

        if appended.is_empty() {
            return None;
        }
        content.push_str(&appended);
        Some(appended)
    }

    // ── Tool calls ───────────────────────────────────────────────────────────

    /// Unsettled tool calls of the most recent assistant message.
    pub fn pending_tool_calls(&self) -> Vec<ToolCallRecord> {
        match self.messages.last() {
            Some(ChatMessage::Assistant { tool_calls, .. }) => {
                tool_calls.iter().filter(|c| c.is_pending()).cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Most recent tool call with this id, settled or not.
    pub fn tool_call(&self, id: &str) -> Option<&ToolCallRecord> {
        self.messages.iter().rev().find_map(|m| match m {
            ChatMessage::Assistant { tool_calls, .. } => tool_calls.iter().find(|c| c.id == id),
            _ => None,
        })
    }

    /// Settle a pending tool call. Returns `false` if no such call is pending.
    pub fn resolve_tool_call(&mut self, id: &str, result: ToolResult) -> bool {
        let Some(ChatMessage::Assistant { tool_calls, .. }) = self.messages.last_mut() else {
            return false;
        };
        match tool_calls.iter_mut().find(|c| c.id == id && c.is_pending()) {
            Some(call) => {
                call.status = ToolCallStatus::Done(result);
                true
            }
            None => false,
        }
    }

    // ── Interruption ─────────────────────────────────────────────────────────

    /// Abort the current turn. With `clear_streaming` the partially streamed
    /// assistant message is discarded.
    pub fn stop(&mut self, clear_streaming: bool) {
        if self.streaming && clear_streaming {
            if let Some(ChatMessage::Assistant { .. }) = self.messages.last() {
                self.messages.pop();
            }
        }
        if let Some(ChatMessage::Assistant { tool_calls, .. }) = self.messages.last_mut() {
            for call in tool_calls.iter_mut().filter(|c| c.is_pending()) {
                call.status = ToolCallStatus::Done(ToolResult::rejected(NOT_RUN));
            }
        }
        debug!(status = %self.status, clear_streaming, "chat turn stopped");
        self.streaming = false;
        self.tool_slots.clear();
        self.status = ChatStatus::Idle;
    }

    /// Record a failure of the current turn.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.streaming {
            if let Some(ChatMessage::Assistant {
                content,
                tool_calls,
            }) = self.messages.last()
            {
                if content.is_empty() && tool_calls.is_empty() {
                    self.messages.pop();
                }
            }
        }
        self.streaming = false;
        self.tool_slots.clear();
        self.messages.push(ChatMessage::Error {
            content: message.clone(),
        });
        self.error = Some(message);
        self.status = ChatStatus::Idle;
    }

    /// Hide the error banner without retrying.
    pub fn dismiss_error(&mut self) {
        self.error = None;
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
