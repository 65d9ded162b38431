//! voice-dots - a voice front end for a chat backend
//!
//! Listens continuously, sends each finalized phrase to a chat service and
//! speaks the reply, while a four-dot indicator pulses during listening.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   utterances    ┌─────────────────────┐   prompt    ┌────────────┐
//! │ SpeechCapture├────────────────►│ VoiceTurnController ├────────────►│ ChatClient │
//! └──────────────┘                 │   (state machine)   │◄────────────┤            │
//!                                  └──┬───────────────┬──┘    reply    └────────────┘
//!                          speak      │               │  ViewState
//!                 ┌───────────────────▼┐          ┌───▼───────────────────────┐
//!                 │   SpeechPlayback   │          │ control API / CLI logging │
//!                 └────────────────────┘          └───────────────────────────┘
//! ```

pub mod animator;
pub mod api;
pub mod chat;
pub mod config;
pub mod controller;
pub mod error;
pub mod voice;

pub use animator::{ActivityAnimator, ActivityLevels};
pub use chat::{ChatClient, HttpChatClient};
pub use config::Config;
pub use controller::{
    Command, ControllerHandle, DisplayMode, Event, TurnState, ViewState, VoiceTurnController,
};
pub use error::{ChatFailure, Error, ErrorKind, Result};
pub use voice::{
    CaptureEvent, CaptureProvider, CaptureSink, SpeechCapture, SpeechPlayback, Utterance,
};
