//! Voice turn controller
//!
//! The single authority over a conversation: one state variable, driven by
//! one event queue, projected to a `ViewState` after every event.
//!
//! ```text
//!            start                 utterance
//!   Idle ───────────► Listening ───────────► AwaitingReply
//!    ▲                 ▲    ▲                  │        │
//!    │ stop /          │    └──── failure ─────┘        │ reply
//!    │ capture ended   │                                ▼
//!    └─────────────────┴──────── playback done ───── Speaking
//! ```
//!
//! Side effects (chat requests, playback, indicator frames) run as tasks
//! that report back through the same queue, so `handle_event` is never reentered.

mod view;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub use view::{DisplayMode, Notice, ViewState};

use crate::animator::{ActivityAnimator, ActivityLevels, Animation};
use crate::chat::ChatClient;
use crate::error::{ChatFailure, Error};
use crate::voice::{
    CaptureEvent, CaptureProvider, CaptureSink, SpeechCapture, SpeechPlayback, Utterance,
};

/// Conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Listening,
    AwaitingReply,
    Speaking,
}

impl TurnState {
    /// Whether capture is engaged in this state
    #[must_use]
    pub const fn is_listening(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// User-issued commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    /// Replace the displayed transcript without sending it
    EditTranscript(String),
    ToggleDisplayMode,
}

/// Everything the controller reacts to
#[derive(Debug)]
pub enum Event {
    Command(Command),
    Capture(CaptureEvent),
    ChatCompleted {
        seq: u64,
        result: std::result::Result<String, ChatFailure>,
    },
    PlaybackFinished {
        seq: u64,
        result: crate::Result<()>,
    },
    Frame {
        generation: u64,
        levels: ActivityLevels,
    },
}

/// Whether the capture engine is engaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Idle,
    Active,
}

/// The capture engine, opened lazily on first start and then reused
struct CaptureSession {
    status: CaptureStatus,
    engine: Option<Box<dyn SpeechCapture>>,
    id: Option<Uuid>,
}

/// One prompt/reply round trip
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub seq: u64,
    pub prompt: String,
    pub reply: Option<String>,
    pub error: Option<ChatFailure>,
}

/// The controller is no longer processing events
#[derive(Debug, Error)]
#[error("voice controller is not running")]
pub struct ControllerGone;

/// Cloneable handle for issuing commands and reading the view
#[derive(Clone)]
pub struct ControllerHandle {
    events: mpsc::UnboundedSender<Event>,
    view: watch::Receiver<ViewState>,
}

impl ControllerHandle {
    /// Queue a command
    ///
    /// # Errors
    ///
    /// Returns `ControllerGone` if the controller has been dropped
    pub fn send(&self, command: Command) -> std::result::Result<(), ControllerGone> {
        self.events
            .send(Event::Command(command))
            .map_err(|_| ControllerGone)
    }

    /// Latest view snapshot
    #[must_use]
    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    /// Receiver notified on every view change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view.clone()
    }
}

/// Coordinates capture, chat and playback into conversational turns
pub struct VoiceTurnController {
    provider: Arc<dyn CaptureProvider>,
    chat: Arc<dyn ChatClient>,
    playback: Arc<dyn SpeechPlayback>,
    animator: ActivityAnimator,

    session: CaptureSession,
    state: TurnState,
    transcript: String,
    reply: Option<String>,
    notice: Option<Notice>,
    display_mode: DisplayMode,
    levels: ActivityLevels,

    in_flight: Option<ConversationTurn>,
    queued: Option<Utterance>,
    speaking: Option<u64>,
    last_applied: u64,

    animation: Option<Animation>,
    generation: u64,

    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    capture_tx: CaptureSink,
    capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    view_tx: watch::Sender<ViewState>,
}

impl VoiceTurnController {
    #[must_use]
    pub fn new(
        provider: Arc<dyn CaptureProvider>,
        chat: Arc<dyn ChatClient>,
        playback: Arc<dyn SpeechPlayback>,
        animator: ActivityAnimator,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let levels = animator.resting();

        Self {
            provider,
            chat,
            playback,
            animator,
            session: CaptureSession {
                status: CaptureStatus::Idle,
                engine: None,
                id: None,
            },
            state: TurnState::Idle,
            transcript: String::new(),
            reply: None,
            notice: None,
            display_mode: DisplayMode::default(),
            levels,
            in_flight: None,
            queued: None,
            speaking: None,
            last_applied: 0,
            animation: None,
            generation: 0,
            events_tx,
            events_rx,
            capture_tx,
            capture_rx,
            view_tx: watch::Sender::new(Self::initial_view(levels)),
        }
    }

    const fn initial_view(levels: ActivityLevels) -> ViewState {
        ViewState {
            state: TurnState::Idle,
            listening: false,
            transcript: String::new(),
            reply: String::new(),
            activity_levels: levels,
            display_mode: DisplayMode::Dark,
            notice: None,
        }
    }

    /// Handle for commands and view subscription
    #[must_use]
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            events: self.events_tx.clone(),
            view: self.view_tx.subscribe(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    #[must_use]
    pub const fn capture_status(&self) -> CaptureStatus {
        self.session.status
    }

    /// Whether a capture engine has ever been opened
    #[must_use]
    pub const fn has_capture_session(&self) -> bool {
        self.session.engine.is_some()
    }

    /// The round trip currently awaiting the backend, if any
    #[must_use]
    pub const fn in_flight(&self) -> Option<&ConversationTurn> {
        self.in_flight.as_ref()
    }

    /// Project the current state for rendering
    #[must_use]
    pub fn view(&self) -> ViewState {
        ViewState {
            state: self.state,
            listening: self.state.is_listening(),
            transcript: self.transcript.clone(),
            reply: self.reply.clone().unwrap_or_default(),
            activity_levels: self.levels,
            display_mode: self.display_mode,
            notice: self.notice.clone(),
        }
    }

    /// Wait for the next event from capture, tasks or commands
    ///
    /// Pending capture events are taken before anything on the internal queue.
    pub async fn next_event(&mut self) -> Option<Event> {
        tokio::select! {
            biased;
            Some(event) = self.capture_rx.recv() => Some(Event::Capture(event)),
            Some(event) = self.events_rx.recv() => Some(event),
            else => None,
        }
    }

    /// Process events for as long as the task lives
    ///
    /// The controller holds its own senders, so this only returns once the
    /// queues are closed; callers abort the task to stop it.
    pub async fn run(mut self) {
        while let Some(event) = self.next_event().await {
            self.handle_event(event);
        }
        tracing::debug!("voice controller finished");
    }

    /// Apply one event, then publish the new view
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Command(Command::Start) => self.start(),
            Event::Command(Command::Stop) => self.stop(),
            Event::Command(Command::EditTranscript(text)) => self.transcript = text,
            Event::Command(Command::ToggleDisplayMode) => {
                self.display_mode = self.display_mode.toggled();
            }
            Event::Capture(CaptureEvent::UtteranceFinalized(utterance)) => {
                self.on_utterance(utterance);
            }
            Event::Capture(CaptureEvent::CaptureError(reason)) => {
                self.surface(&Error::Capture(reason));
            }
            Event::Capture(CaptureEvent::CaptureEnded) => self.on_capture_ended(),
            Event::ChatCompleted { seq, result } => self.on_reply(seq, result),
            Event::PlaybackFinished { seq, result } => self.on_playback_finished(seq, result),
            Event::Frame { generation, levels } => {
                if self.animation.is_some() && generation == self.generation {
                    self.levels = levels;
                }
            }
        }
        self.publish();
    }

    fn publish(&mut self) {
        self.view_tx.send_replace(self.view());
    }

    fn start(&mut self) {
        if self.state != TurnState::Idle {
            tracing::debug!(state = ?self.state, "start ignored, already listening");
            return;
        }

        if self.session.engine.is_none() {
            match self.provider.open(self.capture_tx.clone()) {
                Ok(engine) => {
                    let id = Uuid::new_v4();
                    tracing::debug!(session = %id, "capture session opened");
                    self.session.engine = Some(engine);
                    self.session.id = Some(id);
                }
                Err(e) => {
                    self.surface(&e);
                    return;
                }
            }
        }

        let Some(engine) = self.session.engine.as_mut() else {
            return;
        };

        match engine.start() {
            Ok(()) => {
                self.session.status = CaptureStatus::Active;
                self.notice = None;
                self.transition(TurnState::Listening);
            }
            Err(e) => self.surface(&e),
        }
    }

    fn stop(&mut self) {
        if self.state == TurnState::Idle {
            tracing::debug!("stop ignored, not listening");
            return;
        }

        if let Some(engine) = self.session.engine.as_mut() {
            engine.stop();
        }
        self.session.status = CaptureStatus::Idle;
        self.transcript.clear();

        if let Some(dropped) = self.queued.take() {
            tracing::debug!(seq = dropped.seq, "queued utterance dropped on stop");
        }

        self.transition(TurnState::Idle);
    }

    fn on_capture_ended(&mut self) {
        self.session.status = CaptureStatus::Idle;

        if self.state == TurnState::Idle {
            tracing::debug!(session = ?self.session.id, "capture ended");
            return;
        }

        tracing::warn!(state = ?self.state, "capture ended unexpectedly");
        if let Some(dropped) = self.queued.take() {
            tracing::debug!(seq = dropped.seq, "queued utterance dropped, capture ended");
        }
        self.transition(TurnState::Idle);
    }

    fn on_utterance(&mut self, utterance: Utterance) {
        if utterance.text.trim().is_empty() {
            return;
        }

        if self.state == TurnState::Idle {
            tracing::debug!(seq = utterance.seq, "utterance after capture ended, ignoring");
            return;
        }

        self.transcript.clone_from(&utterance.text);

        if self.state == TurnState::Listening && self.in_flight.is_none() {
            self.dispatch(utterance);
        } else if let Some(superseded) = self.queued.replace(utterance) {
            tracing::debug!(seq = superseded.seq, "queued utterance superseded");
        }
    }

    fn dispatch(&mut self, utterance: Utterance) {
        let seq = utterance.seq;
        let prompt = utterance.text;

        self.in_flight = Some(ConversationTurn {
            seq,
            prompt: prompt.clone(),
            reply: None,
            error: None,
        });

        let chat = Arc::clone(&self.chat);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = chat.send(&prompt).await;
            let _ = events.send(Event::ChatCompleted { seq, result });
        });

        tracing::debug!(seq, "prompt sent");
        self.transition(TurnState::AwaitingReply);
    }

    fn dispatch_queued(&mut self) {
        if self.state != TurnState::Listening || self.in_flight.is_some() {
            return;
        }
        if let Some(utterance) = self.queued.take() {
            self.dispatch(utterance);
        }
    }

    fn on_reply(&mut self, seq: u64, result: std::result::Result<String, ChatFailure>) {
        let mut turn = match self.in_flight.take() {
            Some(turn) if turn.seq == seq => turn,
            other => {
                self.in_flight = other;
                tracing::warn!(seq, "reply for unknown turn discarded");
                return;
            }
        };

        let result = result.and_then(|reply| {
            if reply.trim().is_empty() {
                Err(ChatFailure::MalformedBody("empty reply".to_string()))
            } else {
                Ok(reply)
            }
        });

        match result {
            Ok(_) if seq <= self.last_applied => {
                tracing::warn!(seq, last = self.last_applied, "stale reply discarded");
                if self.state == TurnState::AwaitingReply {
                    self.transition(TurnState::Listening);
                }
            }
            Ok(reply) => {
                turn.reply = Some(reply.clone());
                self.reply = Some(reply.clone());
                self.last_applied = seq;
                self.speak(seq, reply);
                if self.state.is_listening() {
                    self.transition(TurnState::Speaking);
                }
            }
            Err(failure) => {
                turn.error = Some(failure.clone());
                self.surface(&Error::ChatRequestFailed(failure));
                if self.state == TurnState::AwaitingReply {
                    self.transition(TurnState::Listening);
                }
            }
        }

        tracing::debug!(?turn, "turn complete");
        self.dispatch_queued();
    }

    fn speak(&mut self, seq: u64, text: String) {
        self.speaking = Some(seq);

        let playback = Arc::clone(&self.playback);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = playback.speak(&text).await;
            let _ = events.send(Event::PlaybackFinished { seq, result });
        });
    }

    fn on_playback_finished(&mut self, seq: u64, result: crate::Result<()>) {
        if let Err(e) = result {
            self.surface(&e);
        }

        if self.speaking != Some(seq) {
            return;
        }
        self.speaking = None;

        if self.state == TurnState::Speaking {
            self.transition(TurnState::Listening);
            self.dispatch_queued();
        }
    }

    fn surface(&mut self, err: &Error) {
        tracing::warn!(error = %err, state = ?self.state, "voice turn error");
        self.notice = Some(Notice::from(err));
    }

    fn transition(&mut self, to: TurnState) {
        if self.state == to {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?to, "transition");

        if to.is_listening() {
            if self.animation.is_none() {
                self.generation += 1;
                let generation = self.generation;
                let events = self.events_tx.clone();
                self.animation = Some(self.animator.start(move |levels| {
                    let _ = events.send(Event::Frame { generation, levels });
                }));
            }
        } else {
            self.animation = None;
            self.levels = self.animator.resting();
        }

        self.state = to;
    }
}
