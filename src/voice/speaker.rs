//! Synthesized speech playback engine

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AudioPlayback, SpeechPlayback, TextToSpeech};
use crate::config::Config;
use crate::{Error, Result};

/// Speaks text through the speech API and the default output device
///
/// Utterances queue: the playback lock is FIFO-fair, so a `speak` issued
/// while another is playing waits for it to finish and audio never overlaps.
pub struct SynthesizedSpeaker {
    tts: Option<TextToSpeech>,
    unavailable: &'static str,
    playing: Mutex<()>,
}

impl SynthesizedSpeaker {
    /// Build a speaker from configuration
    ///
    /// Never fails: a missing key or disabled voice surfaces as
    /// `PlaybackUnavailable` on each `speak`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        if !config.voice.enabled {
            return Self::unavailable("voice disabled");
        }

        let Some(key) = config.api_keys.openai.clone() else {
            return Self::unavailable("no OpenAI API key configured");
        };

        match TextToSpeech::new(
            key,
            config.voice.tts_model.clone(),
            config.voice.tts_voice.clone(),
            config.voice.speech.clone(),
        ) {
            Ok(tts) => Self::new(tts),
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis unavailable");
                Self::unavailable("speech synthesis not configured")
            }
        }
    }

    #[must_use]
    pub fn new(tts: TextToSpeech) -> Self {
        Self {
            tts: Some(tts),
            unavailable: "",
            playing: Mutex::new(()),
        }
    }

    /// A speaker that reports `PlaybackUnavailable` for every utterance
    #[must_use]
    pub fn unavailable(reason: &'static str) -> Self {
        Self {
            tts: None,
            unavailable: reason,
            playing: Mutex::new(()),
        }
    }
}

#[async_trait]
impl SpeechPlayback for SynthesizedSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let Some(tts) = &self.tts else {
            return Err(Error::PlaybackUnavailable(self.unavailable.to_string()));
        };

        if !AudioPlayback::probe() {
            return Err(Error::PlaybackUnavailable(
                "no output device available".to_string(),
            ));
        }

        let _turn = self.playing.lock().await;

        let mp3 = tts.synthesize(text).await?;
        tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_mp3_blocking(&mp3))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}
