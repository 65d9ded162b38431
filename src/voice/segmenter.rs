//! Phrase endpointing
//!
//! Splits the microphone stream into phrases using RMS energy: a phrase is
//! complete once enough speech has been heard and is followed by silence.
//! Nothing is emitted for partial phrases.

use super::SAMPLE_RATE;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum length of a phrase (0.3 seconds at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends a phrase (0.5 seconds at 16kHz)
const SILENCE_SAMPLES: usize = 8000;

/// Phrases longer than this are cut (30 seconds at 16kHz)
const MAX_SEGMENT_SAMPLES: usize = SAMPLE_RATE as usize * 30;

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Idle,
    /// Speech heard, accumulating a phrase
    Speaking,
}

/// Energy-based phrase segmenter
#[derive(Debug)]
pub struct UtteranceSegmenter {
    state: SegmenterState,
    buffer: Vec<f32>,
    silence: usize,
}

impl Default for UtteranceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceSegmenter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            silence: 0,
        }
    }

    /// Feed a chunk of samples
    ///
    /// Returns the samples of a completed phrase, if this chunk completed one
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!(energy, "speech started");
                }
                None
            }
            SegmenterState::Speaking => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                let spoken = self.buffer.len().saturating_sub(self.silence);

                if self.silence > SILENCE_SAMPLES {
                    if spoken >= MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.buffer.len(), "phrase complete");
                        return Some(self.take());
                    }
                    tracing::trace!("blip too short, discarding");
                    self.reset();
                    return None;
                }

                if self.buffer.len() >= MAX_SEGMENT_SAMPLES {
                    tracing::debug!(samples = self.buffer.len(), "phrase cut at max length");
                    return Some(self.take());
                }

                None
            }
        }
    }

    /// Flush a phrase in progress, if it is long enough to transcribe
    pub fn finish(&mut self) -> Option<Vec<f32>> {
        let spoken = self.buffer.len().saturating_sub(self.silence);
        if self.state == SegmenterState::Speaking && spoken >= MIN_SPEECH_SAMPLES {
            return Some(self.take());
        }
        self.reset();
        None
    }

    /// Drop any phrase in progress
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.buffer.clear();
        self.silence = 0;
    }

    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    /// Samples accumulated for the phrase in progress
    #[must_use]
    pub fn pending(&self) -> &[f32] {
        &self.buffer
    }

    fn take(&mut self) -> Vec<f32> {
        let phrase = std::mem::take(&mut self.buffer);
        self.reset();
        phrase
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
pub(crate) fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
