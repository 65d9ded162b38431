//! Voice capabilities
//!
//! The controller only sees the traits in this module. Concrete engines
//! (microphone + Whisper recognizer, synthesized speaker) live in the
//! submodules and are injected at startup; tests inject scripted fakes.

mod capture;
mod playback;
mod recognizer;
mod segmenter;
mod speaker;
mod stt;
mod tts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::AudioPlayback;
pub use recognizer::{MicrophoneProvider, MicrophoneRecognizer};
pub use segmenter::{SegmenterState, UtteranceSegmenter};
pub use speaker::SynthesizedSpeaker;
pub use stt::SpeechToText;
pub use tts::TextToSpeech;

use crate::Result;

/// A finalized phrase from continuous recognition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Transcript text, trimmed
    pub text: String,

    /// Monotonically increasing per capture engine
    pub seq: u64,
}

impl Utterance {
    #[must_use]
    pub fn new(text: impl Into<String>, seq: u64) -> Self {
        Self {
            text: text.into().trim().to_string(),
            seq,
        }
    }
}

/// Events emitted by a capture engine while it is active
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A phrase was completed and transcribed
    UtteranceFinalized(Utterance),

    /// Recognition failed; does not by itself mean listening stopped
    CaptureError(String),

    /// Listening stopped, for any reason. Emitted exactly once per start
    CaptureEnded,
}

/// Where a capture engine delivers its events
pub type CaptureSink = mpsc::UnboundedSender<CaptureEvent>;

/// A continuous speech-to-text engine
///
/// `start` on an active engine fails with `Error::CaptureAlreadyActive`;
/// `stop` on an inactive engine does nothing.
pub trait SpeechCapture: Send {
    /// Begin continuous listening
    ///
    /// # Errors
    ///
    /// Returns `Error::CaptureAlreadyActive` if already listening, or a
    /// capture error if the engine cannot begin
    fn start(&mut self) -> Result<()>;

    /// Request that listening stop; `CaptureEnded` follows asynchronously
    fn stop(&mut self);

    /// Whether the engine is currently listening
    fn is_active(&self) -> bool;
}

/// Creates capture engines on demand
///
/// The controller opens at most one engine and reuses it across start/stop
/// cycles.
pub trait CaptureProvider: Send + Sync {
    /// Open a capture engine that reports to `sink`
    ///
    /// # Errors
    ///
    /// Returns `Error::CaptureUnavailable` when the machine has no usable
    /// speech-to-text capability
    fn open(&self, sink: CaptureSink) -> Result<Box<dyn SpeechCapture>>;
}

/// A text-to-speech engine that plays one utterance at a time
#[async_trait]
pub trait SpeechPlayback: Send + Sync {
    /// Speak `text` to completion
    ///
    /// # Errors
    ///
    /// Returns `Error::PlaybackUnavailable` when no synthesis capability
    /// exists, or a TTS/audio error if playback fails
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Language, rate and pitch used for recognition and synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSettings {
    /// BCP-47 language tag
    pub language: String,

    /// Speaking rate multiplier
    pub rate: f32,

    /// Speaking pitch multiplier
    pub pitch: f32,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

impl SpeechSettings {
    /// ISO-639-1 prefix of the language tag ("en-US" -> "en")
    #[must_use]
    pub fn language_code(&self) -> String {
        self.language
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }
}
