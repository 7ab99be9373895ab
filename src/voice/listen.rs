//! Bounded listening for one utterance
//!
//! [`Listener`] holds the timing rules (listen timeout, phrase limit) and is
//! fed sample blocks; [`MicrophoneSource`] drives it from the default input
//! device on a blocking thread.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::capture::AudioCapture;
use super::detector::SpeechDetector;
use super::sample::AudioSample;
use crate::config::CaptureConfig;
use crate::{Error, Result};

/// How often the capture buffer is drained
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Source of live utterances for the turn pipeline
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Capture one utterance
    ///
    /// Returns `Ok(None)` when no speech started before the listen timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the device fails or the hard capture limit is hit
    async fn capture(&self) -> Result<Option<AudioSample>>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// Outcome of feeding one block to a [`Listener`]
#[derive(Debug, PartialEq)]
pub enum ListenStep {
    /// Keep feeding samples
    Continue,
    /// A full utterance is available
    Utterance(Vec<f32>),
    /// Nothing was said before the listen timeout
    NoSpeech,
}

/// Applies the capture limits to a stream of sample blocks
pub struct Listener {
    detector: SpeechDetector,
    limits: CaptureConfig,
    phrase_started: Option<Duration>,
}

impl Listener {
    #[must_use]
    pub fn new(sample_rate: u32, limits: CaptureConfig) -> Self {
        Self {
            detector: SpeechDetector::new(sample_rate),
            limits,
            phrase_started: None,
        }
    }

    /// Calibrate against ambient noise recorded before listening
    pub fn calibrate(&mut self, ambient: &[f32]) {
        self.detector.calibrate(ambient);
    }

    /// Feed a block captured `elapsed` after listening began
    pub fn feed(&mut self, block: &[f32], elapsed: Duration) -> ListenStep {
        if self.detector.process(block) {
            return ListenStep::Utterance(self.detector.take_speech_buffer());
        }

        if self.detector.is_speaking() {
            let started = *self.phrase_started.get_or_insert(elapsed);
            if elapsed.saturating_sub(started) >= self.limits.phrase_limit {
                tracing::debug!("phrase limit reached, cutting utterance");
                return ListenStep::Utterance(self.detector.take_speech_buffer());
            }
            return ListenStep::Continue;
        }

        self.phrase_started = None;
        if elapsed >= self.limits.listen_timeout {
            ListenStep::NoSpeech
        } else {
            ListenStep::Continue
        }
    }
}

/// Captures utterances from the host's default microphone
pub struct MicrophoneSource {
    limits: CaptureConfig,
    // one capture at a time per device
    device_lock: Mutex<()>,
}

impl MicrophoneSource {
    #[must_use]
    pub fn new(limits: CaptureConfig) -> Self {
        Self {
            limits,
            device_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AudioSource for MicrophoneSource {
    async fn capture(&self) -> Result<Option<AudioSample>> {
        let _guard = self.device_lock.lock().await;
        let limits = self.limits;
        let hard_limit = limits.hard_limit();

        tracing::info!("listening");
        let task = tokio::task::spawn_blocking(move || listen_blocking(limits));

        match tokio::time::timeout(hard_limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Audio(format!("capture task failed: {e}"))),
            Err(_) => Err(Error::timeout("audio capture", hard_limit)),
        }
    }

    fn name(&self) -> &'static str {
        "microphone"
    }
}

/// Stand-in source for headless servers without audio hardware
pub struct DisabledSource;

#[async_trait]
impl AudioSource for DisabledSource {
    async fn capture(&self) -> Result<Option<AudioSample>> {
        Err(Error::Audio("voice capture disabled".to_string()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Record one utterance from the default input device
fn listen_blocking(limits: CaptureConfig) -> Result<Option<AudioSample>> {
    let mut capture = AudioCapture::new()?;
    capture.start()?;

    std::thread::sleep(limits.calibration);
    let mut listener = Listener::new(capture.sample_rate(), limits);
    listener.calibrate(&capture.take_buffer());

    let started = Instant::now();
    loop {
        std::thread::sleep(POLL_INTERVAL);
        let block = capture.take_buffer();

        match listener.feed(&block, started.elapsed()) {
            ListenStep::Continue => {}
            ListenStep::Utterance(samples) => {
                capture.stop();
                let sample = capture.sample(samples);
                tracing::debug!(duration_ms = sample.duration().as_millis(), "captured utterance");
                return Ok(Some(sample));
            }
            ListenStep::NoSpeech => {
                tracing::info!("timeout: no speech detected");
                return Ok(None);
            }
        }
    }
}
