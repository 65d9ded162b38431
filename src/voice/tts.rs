//! Text-to-speech (TTS) via the `OpenAI` speech API

use super::SpeechSettings;
use crate::{Error, Result};

/// Default `OpenAI` API base
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Slowest and fastest speed the speech API accepts
const MIN_SPEED: f32 = 0.25;
const MAX_SPEED: f32 = 4.0;

/// Synthesizes speech from text
#[derive(Clone)]
pub struct TextToSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    settings: SpeechSettings,
}

impl TextToSpeech {
    /// Create a synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        api_key: String,
        model: String,
        voice: String,
        settings: SpeechSettings,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key,
            model,
            voice,
            settings,
        })
    }

    /// Point at a different OpenAI-compatible server
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Synthesize text to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        // The speech API has no language or pitch parameters; the voice
        // infers language from the text.
        tracing::debug!(
            language = %self.settings.language,
            rate = self.settings.rate,
            pitch = self.settings.pitch,
            chars = text.len(),
            "synthesizing"
        );

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.settings.rate.clamp(MIN_SPEED, MAX_SPEED),
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(format!("speech request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("speech API error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}
