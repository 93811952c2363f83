//! OpenAI chat-completions adapter.
//!
//! [`OpenAiClient`] is the model-streaming client behind `/api/chat`: it
//! converts a [`CompletionRequest`] into an OpenAI streaming request, reads
//! the provider's server-sent events and re-encodes every chunk as a
//! [`Frame`].

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{Frame, encode_frame};
use crate::protocol::{
    ChunkChoice as WireChoice, ChunkDelta as WireDelta, CompletionChunk, CompletionRequest,
    Message, ToolCall, ToolCallDelta, ToolChoice,
};
use crate::sse::{self, MAX_LINE_LEN, SseEvents};

/// Default provider endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Marker closing the provider's event stream.
const DONE_MARKER: &str = "[DONE]";

/// Frames buffered between the upstream reader and the HTTP response.
const FRAME_CHANNEL_CAPACITY: usize = 32;

/// Stream of encoded frames handed to the HTTP response body.
pub type FrameStream = BoxStream<'static, Result<Bytes>>;

/// Anything that can turn a chat request into a stream of encoded frames.
pub trait CompletionStreamer: Send + Sync {
    fn stream(&self, request: CompletionRequest) -> FrameStream;
}

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

/// Request body for `POST {base}/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    pub stream: bool,
}

/// A message in the provider's format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ChatCompletionRequest {
    /// Translate a browser-side request, applying the reasoning-effort transform.
    pub fn from_completion(req: CompletionRequest, effort: Option<ReasoningEffort>) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.system.trim().is_empty() {
            messages.push(ChatMessage::System {
                content: req.system,
            });
        }

        for message in req.messages {
            match message {
                Message::User { content } => messages.push(ChatMessage::User { content }),
                Message::Assistant {
                    content,
                    tool_calls,
                } => {
                    let content = content.filter(|c| !c.is_empty());
                    if content.is_none() && tool_calls.is_empty() {
                        continue;
                    }
                    messages.push(ChatMessage::Assistant {
                        content,
                        tool_calls,
                    });
                }
                Message::Tool {
                    content,
                    tool_call_id,
                    ..
                } => {
                    let content = serde_json::to_string(&content)
                        .unwrap_or_else(|_| r#"{"status":"rejected"}"#.to_owned());
                    messages.push(ChatMessage::Tool {
                        tool_call_id,
                        content,
                    });
                }
                Message::Error { .. } => {}
            }
        }

        let tools = req
            .tools
            .into_iter()
            .map(|t| ChatTool {
                kind: crate::protocol::FUNCTION_CALL,
                function: FunctionDefinition {
                    name: t.name,
                    description: t.description,
                    parameters: t.parameters,
                },
            })
            .collect();

        let response_format = req.response_format.map(|schema| {
            json!({
                "type": "json_schema",
                "json_schema": { "name": "schema", "schema": schema },
            })
        });

        Self {
            model: req.model,
            messages,
            tools,
            tool_choice: req.tool_choice,
            response_format,
            reasoning_effort: effort,
            stream: true,
        }
    }
}

// ── Streamed response types ───────────────────────────────────────────────────

/// One `data:` event of the provider stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub error: Option<ProviderError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

impl From<ChatCompletionChunk> for CompletionChunk {
    fn from(chunk: ChatCompletionChunk) -> Self {
        Self {
            choices: chunk
                .choices
                .into_iter()
                .map(|c| WireChoice {
                    index: c.index,
                    delta: WireDelta {
                        role: c.delta.role,
                        content: c.delta.content,
                        tool_calls: c.delta.tool_calls.unwrap_or_default(),
                    },
                    finish_reason: c.finish_reason,
                })
                .collect(),
        }
    }
}

/// Parsed `data:` payload.
#[derive(Debug)]
enum ProviderEvent {
    Chunk(CompletionChunk),
    Done,
}

fn parse_event(data: &str) -> Result<ProviderEvent> {
    if data.trim() == DONE_MARKER {
        return Ok(ProviderEvent::Done);
    }
    let chunk: ChatCompletionChunk = serde_json::from_str(data)?;
    if let Some(err) = chunk.error {
        return Err(Error::Generation(err.message));
    }
    Ok(ProviderEvent::Chunk(chunk.into()))
}

/// Pull a readable message out of a provider error body.
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_owned())
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Streaming client for the OpenAI chat-completions API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    reasoning_effort: Option<ReasoningEffort>,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gridchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            reasoning_effort: Some(ReasoningEffort::Low),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_reasoning_effort(mut self, effort: Option<ReasoningEffort>) -> Self {
        self.reasoning_effort = effort;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn reasoning_effort(&self) -> Option<ReasoningEffort> {
        self.reasoning_effort
    }

    /// Build the provider request for `req`.
    pub fn build_request(&self, req: CompletionRequest) -> ChatCompletionRequest {
        ChatCompletionRequest::from_completion(req, self.reasoning_effort)
    }

    /// Drive one generation, writing frames into `tx` until the upstream ends.
    async fn forward(self, request: CompletionRequest, tx: mpsc::Sender<Result<Bytes>>) {
        if !send_frame(&tx, &Frame::GenerationStart).await {
            return;
        }

        match self.pump(request, &tx).await {
            Ok(true) => {
                send_frame(&tx, &Frame::GenerationFinish).await;
            }
            Ok(false) => debug!("downstream closed; upstream generation abandoned"),
            Err(e) => {
                warn!(error = %e, "upstream generation failed");
                send_frame(
                    &tx,
                    &Frame::GenerationError {
                        error: e.to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// Returns `Ok(false)` when the downstream receiver went away.
    async fn pump(&self, request: CompletionRequest, tx: &mpsc::Sender<Result<Bytes>>) -> Result<bool> {
        let body = self.build_request(request);
        info!(model = %body.model, messages = body.messages.len(), tools = body.tools.len(), "opening upstream stream");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                status: status.as_u16(),
                message: provider_error_message(&text),
            });
        }

        let mut events = SseEvents::new();
        let mut lines = std::pin::pin!(sse::lines(response.bytes_stream(), MAX_LINE_LEN));
        let mut chunks = 0usize;

        while let Some(line) = lines.next().await {
            let Some(data) = events.push_line(&line?) else {
                continue;
            };
            match parse_event(&data)? {
                ProviderEvent::Done => {
                    debug!(chunks, "upstream stream done");
                    return Ok(true);
                }
                ProviderEvent::Chunk(chunk) => {
                    chunks += 1;
                    if !send_frame(tx, &Frame::GenerationChunk { chunk }).await {
                        return Ok(false);
                    }
                }
            }
        }

        if let Some(data) = events.finish() {
            if let ProviderEvent::Chunk(chunk) = parse_event(&data)? {
                if !send_frame(tx, &Frame::GenerationChunk { chunk }).await {
                    return Ok(false);
                }
            }
        }

        debug!(chunks, "upstream stream closed without done marker");
        Ok(true)
    }
}

impl CompletionStreamer for OpenAiClient {
    fn stream(&self, request: CompletionRequest) -> FrameStream {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        tokio::spawn(self.clone().forward(request, tx));
        ReceiverStream::new(rx).boxed()
    }
}

/// Encode and send one frame; `false` once the receiver is gone.
async fn send_frame(tx: &mpsc::Sender<Result<Bytes>>, frame: &Frame) -> bool {
    match encode_frame(frame) {
        Ok(bytes) => tx.send(Ok(bytes)).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "dropping frame that failed to encode");
            true
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{FunctionCall, ToolResult, ToolSpec};

    fn request(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: "gpt-5".into(),
            system: "You are an analyst.".into(),
            messages,
            tools: vec![ToolSpec {
                name: "updateGridState".into(),
                description: "Update the grid state".into(),
                parameters: json!({ "type": "object" }),
            }],
            tool_choice: None,
            response_format: None,
        }
    }

    #[test]
    fn conversion_prepends_system_and_drops_error_messages() {
        let req = request(vec![
            Message::User {
                content: "group by sector".into(),
            },
            Message::Error {
                content: "network down".into(),
            },
        ]);

        let out = ChatCompletionRequest::from_completion(req, Some(ReasoningEffort::Low));
        assert_eq!(out.messages.len(), 2);
        assert_eq!(
            out.messages[0],
            ChatMessage::System {
                content: "You are an analyst.".into()
            }
        );
        assert!(out.stream);

        let body = serde_json::to_value(&out).unwrap();
        assert_eq!(body["reasoning_effort"], "low");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "updateGridState");
    }

    #[test]
    fn conversion_maps_tool_calls_and_results() {
        let req = request(vec![
            Message::User {
                content: "sort by price".into(),
            },
            Message::Assistant {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".into(),
                    kind: "function".into(),
                    function: FunctionCall {
                        name: "updateGridState".into(),
                        arguments: "{}".into(),
                    },
                }],
            },
            Message::Tool {
                content: ToolResult::fulfilled(Value::Null),
                tool_call_id: "call_1".into(),
                tool_name: "updateGridState".into(),
            },
        ]);

        let body = serde_json::to_value(ChatCompletionRequest::from_completion(req, None)).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
        assert!(messages[2].get("content").is_none());
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        let result: Value = serde_json::from_str(messages[3]["content"].as_str().unwrap()).unwrap();
        assert_eq!(result["status"], "fulfilled");
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn empty_assistant_turns_are_skipped() {
        let req = request(vec![Message::Assistant {
            content: Some(String::new()),
            tool_calls: vec![],
        }]);
        let out = ChatCompletionRequest::from_completion(req, None);
        assert_eq!(out.messages.len(), 1);
    }

    #[test]
    fn response_format_is_wrapped_as_json_schema() {
        let mut req = request(vec![]);
        req.response_format = Some(json!({ "type": "object" }));
        let body = serde_json::to_value(ChatCompletionRequest::from_completion(req, None)).unwrap();
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["schema"]["type"], "object");
        assert_eq!(body["response_format"]["json_schema"]["name"], "schema");
        assert!(body["response_format"]["json_schema"].get("strict").is_none());
    }

    #[test]
    fn provider_chunk_maps_to_camel_case_chunk() {
        let data = r#"{"id":"x","object":"chat.completion.chunk","choices":[{"index":0,
            "delta":{"tool_calls":[{"index":0,"id":"call_9","type":"function",
            "function":{"name":"updateGridState","arguments":"{\"sort\""}}]},
            "finish_reason":null}]}"#;

        let ProviderEvent::Chunk(chunk) = parse_event(data).unwrap() else {
            panic!("expected a chunk");
        };
        let value = serde_json::to_value(&chunk).unwrap();
        let call = &value["choices"][0]["delta"]["toolCalls"][0];
        assert_eq!(call["id"], "call_9");
        assert_eq!(call["function"]["arguments"], "{\"sort\"");
    }

    #[test]
    fn done_marker_and_inline_errors_are_recognised() {
        assert!(matches!(parse_event("[DONE]").unwrap(), ProviderEvent::Done));
        let err = parse_event(r#"{"error":{"message":"overloaded"}}"#).unwrap_err();
        assert!(matches!(err, Error::Generation(m) if m == "overloaded"));
    }

    #[test]
    fn provider_error_body_is_unwrapped() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(provider_error_message(body), "Incorrect API key provided");
        assert_eq!(provider_error_message(" bad gateway \n"), "bad gateway");
    }

    #[test]
    fn reasoning_effort_parses_case_insensitively() {
        assert_eq!("LOW".parse::<ReasoningEffort>().unwrap(), ReasoningEffort::Low);
        assert_eq!(ReasoningEffort::Minimal.to_string(), "minimal");
        assert!("extreme".parse::<ReasoningEffort>().is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = OpenAiClient::new("sk-test").with_base_url("http://localhost:9000/v1/");
        assert_eq!(client.base_url(), "http://localhost:9000/v1");
        assert_eq!(client.reasoning_effort(), Some(ReasoningEffort::Low));
    }
}
