//! Error types for musicgen-rs.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or incomplete tokenizer definition.
    #[error("parse: {0}")]
    Parse(String),

    /// A required special token (or an unknown-token fallback) is not mapped.
    #[error("missing token: {0}")]
    MissingToken(String),

    /// The external inference engine failed or returned an unexpected shape.
    #[error("inference: {0}")]
    Inference(String),

    /// Candle tensor error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Audio encoding error (WAV I/O).
    #[error("audio: {0}")]
    Audio(String),

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// Generation manager failure (worker gone, reply dropped).
    #[error("manager: {0}")]
    Manager(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Audio(error.to_string())
    }
}
