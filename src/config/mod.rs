//! Configuration management for voice-dots

pub mod file;

use std::time::Duration;

use crate::voice::SpeechSettings;

/// Default chat backend base URL
pub const DEFAULT_CHAT_URL: &str = "http://localhost:3001";

/// Default control server port
pub const DEFAULT_PORT: u16 = 3002;

/// voice-dots configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat backend configuration
    pub chat: ChatConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Local control server configuration
    pub api_server: ApiServerConfig,

    /// Listening indicator configuration
    pub animator: AnimatorConfig,
}

/// Chat backend configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL; requests go to `<url>/chat`
    pub url: String,

    /// Bound on a single round trip
    pub timeout: Duration,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable voice input and output
    pub enabled: bool,

    /// Language, rate and pitch for recognition and synthesis
    pub speech: SpeechSettings,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper and TTS)
    pub openai: Option<String>,
}

/// Local control server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Serve the control API
    pub enabled: bool,

    /// Port to listen on
    pub port: u16,
}

/// Listening indicator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimatorConfig {
    /// Refresh interval while listening
    pub interval: Duration,

    /// Resting magnitude of every dot
    pub base: u32,

    /// Exclusive upper bound of the random jitter added while listening
    pub jitter: u32,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(300),
            base: 15,
            jitter: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat: ChatConfig {
                url: DEFAULT_CHAT_URL.to_string(),
                timeout: Duration::from_secs(30),
            },
            voice: VoiceConfig {
                enabled: true,
                speech: SpeechSettings::default(),
                stt_model: "whisper-1".to_string(),
                tts_model: "tts-1".to_string(),
                tts_voice: "alloy".to_string(),
            },
            api_keys: ApiKeys::default(),
            api_server: ApiServerConfig {
                enabled: true,
                port: DEFAULT_PORT,
            },
            animator: AnimatorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    #[must_use]
    pub fn load() -> Self {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit voice disable option
    #[must_use]
    pub fn load_with_options(disable_voice: bool) -> Self {
        let config = Self::from_file(file::load_config_file(), disable_voice);

        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }

        config
    }

    /// Resolve configuration from a parsed file, letting env vars win
    #[must_use]
    pub fn from_file(fc: file::ConfigFile, disable_voice: bool) -> Self {
        let default = Self::default();

        let chat = ChatConfig {
            url: std::env::var("VOICE_DOTS_CHAT_URL")
                .ok()
                .or(fc.chat.url)
                .unwrap_or(default.chat.url),
            timeout: std::env::var("VOICE_DOTS_CHAT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.chat.timeout_secs)
                .map_or(default.chat.timeout, Duration::from_secs),
        };

        let speech = SpeechSettings {
            language: fc.voice.language.unwrap_or(default.voice.speech.language),
            rate: fc.voice.rate.unwrap_or(default.voice.speech.rate),
            pitch: fc.voice.pitch.unwrap_or(default.voice.speech.pitch),
        };

        let voice = VoiceConfig {
            enabled: !disable_voice && fc.voice.enabled.unwrap_or(true),
            speech,
            stt_model: std::env::var("VOICE_DOTS_STT_MODEL")
                .ok()
                .or(fc.voice.stt_model)
                .unwrap_or(default.voice.stt_model),
            tts_model: std::env::var("VOICE_DOTS_TTS_MODEL")
                .ok()
                .or(fc.voice.tts_model)
                .unwrap_or(default.voice.tts_model),
            tts_voice: fc.voice.tts_voice.unwrap_or(default.voice.tts_voice),
        };

        let api_keys = ApiKeys {
            openai: std::env::var("OPENAI_API_KEY")
                .ok()
                .or(fc.api_keys.openai)
                .filter(|k| !k.is_empty()),
        };

        let api_server = ApiServerConfig {
            enabled: fc.server.enabled.unwrap_or(true),
            port: std::env::var("VOICE_DOTS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(default.api_server.port),
        };

        let animator = AnimatorConfig {
            interval: fc
                .animator
                .interval_ms
                .filter(|ms| *ms > 0)
                .map_or(default.animator.interval, Duration::from_millis),
            base: fc.animator.base.unwrap_or(default.animator.base),
            jitter: fc.animator.jitter.unwrap_or(default.animator.jitter),
        };

        Self {
            chat,
            voice,
            api_keys,
            api_server,
            animator,
        }
    }

    /// Endpoint the chat client posts to
    #[must_use]
    pub fn chat_endpoint(&self) -> String {
        format!("{}/chat", self.chat.url.trim_end_matches('/'))
    }
}
