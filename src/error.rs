//! Error types for voice-dots

use serde::Serialize;
use thiserror::Error;

/// Result type alias for voice-dots operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in voice-dots
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No speech-to-text capability on this machine
    #[error("speech capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Capture was started while already listening
    #[error("speech capture already active")]
    CaptureAlreadyActive,

    /// Recognition failure reported by the capture engine
    #[error("speech capture error: {0}")]
    Capture(String),

    /// Chat backend round trip failed
    #[error("chat request failed: {0}")]
    ChatRequestFailed(#[from] ChatFailure),

    /// No speech synthesis capability on this machine
    #[error("speech playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Ways a chat round trip can fail
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatFailure {
    /// Connection or protocol failure before a response arrived
    #[error("transport: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("backend returned status {0}")]
    BadStatus(u16),

    /// Response body was not `{ "obj": { "reply": string } }`
    #[error("malformed response: {0}")]
    MalformedBody(String),

    /// No response within the configured timeout
    #[error("timed out")]
    Timeout,
}

/// Error categories surfaced to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CaptureUnavailable,
    CaptureAlreadyActive,
    CaptureError,
    ChatRequestFailed,
    PlaybackUnavailable,
    Internal,
}

impl Error {
    /// Category of this error as shown to the user
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CaptureUnavailable(_) => ErrorKind::CaptureUnavailable,
            Self::CaptureAlreadyActive => ErrorKind::CaptureAlreadyActive,
            Self::Capture(_) | Self::Stt(_) => ErrorKind::CaptureError,
            Self::ChatRequestFailed(_) => ErrorKind::ChatRequestFailed,
            Self::PlaybackUnavailable(_) => ErrorKind::PlaybackUnavailable,
            Self::Config(_)
            | Self::Audio(_)
            | Self::Tts(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Serialization(_)
            | Self::Toml(_) => ErrorKind::Internal,
        }
    }
}
