use thiserror::Error;

/// Errors that can be returned by gridchat-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An HTTP request failed (network error, broken body stream, etc.).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Reading or writing a framed byte stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider's event stream could not be split into lines.
    #[error("event stream error: {0}")]
    EventStream(#[from] tokio_util::codec::LinesCodecError),

    /// Failed to serialize or deserialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote end answered with a non-success HTTP status.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// A frame is longer than the codec accepts.
    #[error("frame too large (limit {limit} bytes)")]
    FrameTooLarge { limit: usize },

    /// The byte stream ended in the middle of a frame.
    #[error("stream ended in the middle of a frame")]
    TruncatedFrame,

    /// The model provider reported a failure while generating.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The chat session cannot perform the operation in its current state.
    #[error("invalid session state: {0}")]
    InvalidState(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
