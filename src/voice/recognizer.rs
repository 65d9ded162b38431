//! Continuous speech recognizer
//!
//! Microphone -> phrase segmenter -> Whisper, reported as `CaptureEvent`s.
//! A dedicated OS thread owns the cpal stream (not `Send`) and hands
//! completed phrases to an async task that transcribes them in order.

use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;

use super::{
    AudioCapture, CaptureEvent, CaptureProvider, CaptureSink, SAMPLE_RATE, SpeechCapture,
    SpeechToText, Utterance, UtteranceSegmenter, samples_to_wav,
};
use crate::config::Config;
use crate::{Error, Result};

/// How often the capture thread drains the microphone buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A stream that delivers nothing for this long is treated as lost
const STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on opening the input device
const STARTUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Opens microphone recognizers when voice is configured
pub struct MicrophoneProvider {
    stt: Option<SpeechToText>,
    unavailable: &'static str,
}

impl MicrophoneProvider {
    /// Build a provider from configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        if !config.voice.enabled {
            return Self::unavailable("voice disabled");
        }

        let Some(key) = config.api_keys.openai.clone() else {
            return Self::unavailable("no OpenAI API key configured");
        };

        match SpeechToText::new(
            key,
            config.voice.stt_model.clone(),
            config.voice.speech.language_code(),
        ) {
            Ok(stt) => Self {
                stt: Some(stt),
                unavailable: "",
            },
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition unavailable");
                Self::unavailable("speech recognition not configured")
            }
        }
    }

    const fn unavailable(reason: &'static str) -> Self {
        Self {
            stt: None,
            unavailable: reason,
        }
    }
}

impl CaptureProvider for MicrophoneProvider {
    fn open(&self, sink: CaptureSink) -> Result<Box<dyn SpeechCapture>> {
        let Some(stt) = &self.stt else {
            return Err(Error::CaptureUnavailable(self.unavailable.to_string()));
        };

        if !AudioCapture::probe() {
            return Err(Error::CaptureUnavailable(
                "no input device available".to_string(),
            ));
        }

        let runtime = Handle::try_current()
            .map_err(|_| Error::CaptureUnavailable("no async runtime".to_string()))?;

        Ok(Box::new(MicrophoneRecognizer::new(stt.clone(), sink, runtime)))
    }
}

/// One start..end cycle of the recognizer
#[derive(Default)]
struct Run {
    stop: AtomicBool,
    ended: AtomicBool,
}

impl Run {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Report `CaptureEnded`, at most once per run
    fn end(&self, sink: &CaptureSink) {
        if !self.ended.swap(true, Ordering::AcqRel) {
            let _ = sink.send(CaptureEvent::CaptureEnded);
        }
    }
}

/// Continuous recognizer over the default microphone
pub struct MicrophoneRecognizer {
    stt: SpeechToText,
    sink: CaptureSink,
    runtime: Handle,
    next_seq: Arc<AtomicU64>,
    run: Option<Arc<Run>>,
}

impl MicrophoneRecognizer {
    #[must_use]
    pub fn new(stt: SpeechToText, sink: CaptureSink, runtime: Handle) -> Self {
        Self {
            stt,
            sink,
            runtime,
            next_seq: Arc::new(AtomicU64::new(0)),
            run: None,
        }
    }
}

impl SpeechCapture for MicrophoneRecognizer {
    fn start(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(Error::CaptureAlreadyActive);
        }

        let run = Arc::new(Run::default());
        let (phrase_tx, phrase_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread_run = Arc::clone(&run);
        let thread_sink = self.sink.clone();
        std::thread::Builder::new()
            .name("voice-dots-mic".to_string())
            .spawn(move || capture_loop(&thread_run, &thread_sink, &phrase_tx, &ready_tx))?;

        wait_for_device(&ready_rx, &run, STARTUP_TIMEOUT)?;

        self.runtime.spawn(transcribe_loop(
            self.stt.clone(),
            Arc::clone(&run),
            self.sink.clone(),
            Arc::clone(&self.next_seq),
            phrase_rx,
        ));

        self.run = Some(run);
        tracing::info!("speech recognition started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            if !run.ended() {
                run.stop.store(true, Ordering::Release);
                run.end(&self.sink);
                tracing::info!("speech recognition stopped");
            }
        }
    }

    fn is_active(&self) -> bool {
        self.run.as_ref().is_some_and(|run| !run.ended())
    }
}

/// Wait for the microphone thread to report whether the device opened
///
/// Blocks the calling thread for at most `timeout`; on a multi-thread
/// runtime worker the wait is moved off the scheduler. A timed-out run is
/// flagged to stop so the thread exits once the device does open.
fn wait_for_device(
    ready: &std::sync::mpsc::Receiver<Result<()>>,
    run: &Run,
    timeout: Duration,
) -> Result<()> {
    let wait = || match ready.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            run.stop.store(true, Ordering::Release);
            Err(Error::Capture("microphone did not start in time".to_string()))
        }
        Err(RecvTimeoutError::Disconnected) => Err(Error::Capture(
            "microphone thread exited during startup".to_string(),
        )),
    };

    let on_worker = Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if on_worker {
        tokio::task::block_in_place(wait)
    } else {
        wait()
    }
}

/// Microphone thread: drain audio, cut phrases, hand them to the transcriber
fn capture_loop(
    run: &Run,
    sink: &CaptureSink,
    phrases: &mpsc::UnboundedSender<Vec<f32>>,
    ready: &std::sync::mpsc::Sender<Result<()>>,
) {
    let mut mic = match AudioCapture::new().and_then(|mut mic| {
        mic.start()?;
        Ok(mic)
    }) {
        Ok(mic) => {
            let _ = ready.send(Ok(()));
            mic
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut segmenter = UtteranceSegmenter::new();
    let mut last_audio = Instant::now();

    while !run.stopped() {
        std::thread::sleep(POLL_INTERVAL);

        let samples = mic.take_buffer();
        if samples.is_empty() {
            if last_audio.elapsed() > STALL_TIMEOUT {
                tracing::warn!("microphone stopped delivering audio");
                let _ = sink.send(CaptureEvent::CaptureError(
                    "microphone stopped delivering audio".to_string(),
                ));
                break;
            }
            continue;
        }
        last_audio = Instant::now();

        if let Some(phrase) = segmenter.push(&samples) {
            if phrases.send(phrase).is_err() {
                break;
            }
        }
    }

    mic.stop();
    if !run.stopped() {
        if let Some(phrase) = segmenter.finish() {
            let _ = phrases.send(phrase);
        }
    }
}

/// Transcribe phrases in arrival order; reports `CaptureEnded` when the
/// microphone thread is gone
async fn transcribe_loop(
    stt: SpeechToText,
    run: Arc<Run>,
    sink: CaptureSink,
    next_seq: Arc<AtomicU64>,
    mut phrases: mpsc::UnboundedReceiver<Vec<f32>>,
) {
    while let Some(samples) = phrases.recv().await {
        if run.stopped() {
            continue;
        }

        let result = match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => stt.transcribe(wav).await,
            Err(e) => Err(e),
        };

        if run.stopped() {
            continue;
        }

        match result {
            Ok(text) if text.trim().is_empty() => {
                tracing::trace!("empty transcript, skipping");
            }
            Ok(text) => {
                let seq = next_seq.fetch_add(1, Ordering::AcqRel) + 1;
                let _ = sink.send(CaptureEvent::UtteranceFinalized(Utterance::new(text, seq)));
            }
            Err(e) => {
                tracing::warn!(error = %e, "phrase transcription failed");
                let _ = sink.send(CaptureEvent::CaptureError(e.to_string()));
            }
        }
    }

    run.end(&sink);
}
