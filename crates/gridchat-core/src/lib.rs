//! Chat-driven data grid: wire protocol, provider adapter, grid model and
//! the client-side chat state shared by the gridchat server and CLI.

pub mod client;
pub mod error;
pub mod frame;
pub mod grid;
pub mod openai;
pub mod panel;
pub mod prompt;
pub mod protocol;
pub mod session;
pub mod sse;
pub mod tool;

pub use client::ChatClient;
pub use error::{Error, Result};
pub use frame::{Frame, FrameCodec, encode_frame, read_frames};
pub use grid::{Grid, GridApi, GridError, GridState};
pub use openai::{CompletionStreamer, FrameStream, OpenAiClient, ReasoningEffort};
pub use panel::ChatPanel;
pub use protocol::{CompletionChunk, CompletionRequest, Message, ToolResult, ToolSpec};
pub use session::{ChatEvent, ChatMessage, ChatSession, ChatStatus};
pub use tool::{Tool, Toolbox, UpdateGridState};
