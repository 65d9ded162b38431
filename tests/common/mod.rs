//! Shared test utilities
//!
//! Scripted stand-ins for the capture, chat and playback engines, plus
//! helpers for driving a `VoiceTurnController` one event at a time.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use voice_dots::config::AnimatorConfig;
use voice_dots::controller::Event;
use voice_dots::voice::{
    CaptureEvent, CaptureProvider, CaptureSink, SpeechCapture, SpeechPlayback, Utterance,
};
use voice_dots::{ActivityAnimator, ChatClient, ChatFailure, Error, Result, VoiceTurnController};

/// How long a test waits for the controller's next event
const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Observes and drives the fake capture engine from the test body
#[derive(Default)]
pub struct CaptureProbe {
    opens: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    active: AtomicBool,
    sink: Mutex<Option<CaptureSink>>,
}

impl CaptureProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Deliver an event as if the engine produced it
    pub fn emit(&self, event: CaptureEvent) {
        let sink = self.sink.lock().unwrap();
        sink.as_ref()
            .expect("capture engine was never opened")
            .send(event)
            .expect("controller dropped");
    }

    /// Finalize a phrase
    pub fn utter(&self, text: &str, seq: u64) {
        self.emit(CaptureEvent::UtteranceFinalized(Utterance::new(text, seq)));
    }

    /// The platform stops listening on its own
    pub fn end_unsolicited(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.emit(CaptureEvent::CaptureEnded);
    }
}

/// Capture engine backed by a `CaptureProbe`
struct FakeCapture {
    probe: Arc<CaptureProbe>,
}

impl SpeechCapture for FakeCapture {
    fn start(&mut self) -> Result<()> {
        if self.probe.active.swap(true, Ordering::SeqCst) {
            return Err(Error::CaptureAlreadyActive);
        }
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        if !self.probe.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(sink) = self.probe.sink.lock().unwrap().as_ref() {
            let _ = sink.send(CaptureEvent::CaptureEnded);
        }
    }

    fn is_active(&self) -> bool {
        self.probe.is_active()
    }
}

/// Provider that opens `FakeCapture` engines, or reports none available
pub struct ScriptedProvider {
    probe: Arc<CaptureProbe>,
    available: bool,
}

impl ScriptedProvider {
    pub fn new(probe: Arc<CaptureProbe>) -> Self {
        Self {
            probe,
            available: true,
        }
    }

    pub fn unavailable(probe: Arc<CaptureProbe>) -> Self {
        Self {
            probe,
            available: false,
        }
    }
}

impl CaptureProvider for ScriptedProvider {
    fn open(&self, sink: CaptureSink) -> Result<Box<dyn SpeechCapture>> {
        if !self.available {
            return Err(Error::CaptureUnavailable(
                "speech recognition not supported".to_string(),
            ));
        }
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        *self.probe.sink.lock().unwrap() = Some(sink);
        Ok(Box::new(FakeCapture {
            probe: Arc::clone(&self.probe),
        }))
    }
}

/// Chat backend that answers from a script
///
/// Unscripted prompts are answered with `"echo: <prompt>"`. When gated,
/// each reply waits for a `release`.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<std::result::Result<String, ChatFailure>>>,
    prompts: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn reply(self, reply: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
        self
    }

    pub fn fail(self, failure: ChatFailure) -> Self {
        self.replies.lock().unwrap().push_back(Err(failure));
        self
    }

    /// Let one gated request complete
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn send(&self, prompt: &str) -> std::result::Result<String, ChatFailure> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("gate closed")
                .forget();
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("echo: {prompt}")))
    }
}

/// Playback engine that records what it was asked to say
pub struct RecordingPlayback {
    spoken: Mutex<Vec<String>>,
    available: bool,
    gate: Option<Semaphore>,
}

impl Default for RecordingPlayback {
    fn default() -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            available: true,
            gate: None,
        }
    }
}

impl RecordingPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Each utterance stays "playing" until `release`
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechPlayback for RecordingPlayback {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());

        if !self.available {
            return Err(Error::PlaybackUnavailable(
                "speech synthesis not supported".to_string(),
            ));
        }

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("gate closed")
                .forget();
        }
        Ok(())
    }
}

/// Indicator settings used by every test controller
pub fn test_animator() -> ActivityAnimator {
    ActivityAnimator::new(AnimatorConfig {
        interval: Duration::from_millis(10),
        base: 15,
        jitter: 10,
    })
}

/// A controller wired to fakes, with handles to observe them
pub struct Harness {
    pub controller: VoiceTurnController,
    pub capture: Arc<CaptureProbe>,
    pub chat: Arc<ScriptedChat>,
    pub playback: Arc<RecordingPlayback>,
}

impl Harness {
    pub fn new(chat: ScriptedChat, playback: RecordingPlayback) -> Self {
        let capture = Arc::new(CaptureProbe::default());
        let provider = Arc::new(ScriptedProvider::new(Arc::clone(&capture)));
        Self::with_provider(capture, provider, chat, playback)
    }

    pub fn without_capture(chat: ScriptedChat, playback: RecordingPlayback) -> Self {
        let capture = Arc::new(CaptureProbe::default());
        let provider = Arc::new(ScriptedProvider::unavailable(Arc::clone(&capture)));
        Self::with_provider(capture, provider, chat, playback)
    }

    fn with_provider(
        capture: Arc<CaptureProbe>,
        provider: Arc<ScriptedProvider>,
        chat: ScriptedChat,
        playback: RecordingPlayback,
    ) -> Self {
        let chat = Arc::new(chat);
        let playback = Arc::new(playback);
        let controller = VoiceTurnController::new(
            provider,
            Arc::clone(&chat) as Arc<dyn ChatClient>,
            Arc::clone(&playback) as Arc<dyn SpeechPlayback>,
            test_animator(),
        );

        Self {
            controller,
            capture,
            chat,
            playback,
        }
    }

    async fn next(&mut self) -> Event {
        tokio::time::timeout(EVENT_TIMEOUT, self.controller.next_event())
            .await
            .expect("timed out waiting for controller event")
            .expect("controller event queue closed")
    }

    /// Process events until one that is not an indicator frame has been handled
    pub async fn step(&mut self) {
        loop {
            let event = self.next().await;
            let frame = matches!(event, Event::Frame { .. });
            self.controller.handle_event(event);
            if !frame {
                return;
            }
        }
    }

    /// Process events, frames included, until `done` holds
    pub async fn run_until(&mut self, done: impl Fn(&VoiceTurnController) -> bool) {
        while !done(&self.controller) {
            let event = self.next().await;
            self.controller.handle_event(event);
        }
    }

    /// Apply a command immediately, ahead of anything still queued
    pub fn command(&mut self, command: voice_dots::Command) {
        self.controller.handle_event(Event::Command(command));
    }
}
