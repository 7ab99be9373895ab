//! Speech activity detection
//!
//! Splits a live sample stream into one utterance using an energy threshold
//! that is calibrated against ambient noise before listening starts.

use super::sample::rms;

/// Energy threshold used when no calibration has run
const ENERGY_THRESHOLD: f32 = 0.03;

/// Calibrated thresholds never drop below this
const MIN_ENERGY_THRESHOLD: f32 = 0.01;

/// Calibrated thresholds never rise above this
const MAX_ENERGY_THRESHOLD: f32 = 0.2;

/// Ambient level multiplier applied during calibration
const AMBIENT_RATIO: f32 = 1.5;

/// Minimum speech before an utterance can complete (seconds)
const MIN_SPEECH_SECS: f32 = 0.3;

/// Trailing silence that ends an utterance (seconds)
const PAUSE_SECS: f32 = 0.8;

/// State of the speech detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Waiting,
    /// Speech started, accumulating
    Speaking,
    /// Utterance ended with a pause
    Complete,
}

/// Detects the start and end of one spoken utterance
pub struct SpeechDetector {
    threshold: f32,
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    min_speech_samples: usize,
    pause_samples: usize,
}

impl SpeechDetector {
    /// Create a detector for audio at `sample_rate`
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn new(sample_rate: u32) -> Self {
        let rate = sample_rate as f32;
        Self {
            threshold: ENERGY_THRESHOLD,
            state: DetectorState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            min_speech_samples: (rate * MIN_SPEECH_SECS) as usize,
            pause_samples: (rate * PAUSE_SECS) as usize,
        }
    }

    /// Adjust the threshold to the ambient noise level
    pub fn calibrate(&mut self, ambient: &[f32]) {
        if ambient.is_empty() {
            return;
        }
        let level = rms(ambient);
        self.threshold = (level * AMBIENT_RATIO).clamp(MIN_ENERGY_THRESHOLD, MAX_ENERGY_THRESHOLD);
        tracing::debug!(ambient = level, threshold = self.threshold, "calibrated speech threshold");
    }

    /// Current energy threshold
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Process a block of samples
    ///
    /// Returns true once an utterance has completed
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = rms(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Waiting => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > self.pause_samples {
                    let spoken = self.speech_buffer.len().saturating_sub(self.silence_counter);
                    if spoken >= self.min_speech_samples {
                        self.state = DetectorState::Complete;
                        tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                    } else {
                        tracing::trace!(spoken, "discarding short noise burst");
                        self.reset();
                    }
                }
            }
            DetectorState::Complete => {}
        }

        self.state == DetectorState::Complete
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// True while an utterance is being accumulated
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == DetectorState::Speaking
    }

    /// Get the accumulated speech buffer
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Take the speech buffer and return to waiting
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        let buffer = std::mem::take(&mut self.speech_buffer);
        self.reset();
        buffer
    }

    /// Reset to waiting, keeping the calibrated threshold
    pub fn reset(&mut self) {
        self.state = DetectorState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }
}
