//! Shared test utilities: scripted providers and a pipeline harness
#![allow(dead_code)]

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tempfile::TempDir;

use codecoach::config::DEFAULT_TOPIC;
use codecoach::llm::{ReplyPolicy, ResponseGenerator, TextGenerator};
use codecoach::pipeline::TurnOrchestrator;
use codecoach::session::SessionRegistry;
use codecoach::stt::{Transcriber, TranscriptionAdapter, TranscriptionHint};
use codecoach::tts::{AudioStore, ChunkStream, SpeechProvider, Synthesizer};
use codecoach::voice::{AudioSample, AudioSource, SAMPLE_RATE};
use codecoach::{Error, Result};

/// Per-call deadline used by every harness stage
pub const CALL_TIMEOUT: Duration = Duration::from_millis(250);

/// Records how often a mock was called and with what
#[derive(Clone, Default)]
pub struct Probe {
    calls: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Probe {
    fn record(&self, input: &[u8]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.to_vec());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.inputs()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }
}

/// What a scripted transcriber hears
#[derive(Clone)]
pub enum Heard {
    Text(&'static str),
    Fail,
    /// Never answers within the call timeout
    Hang,
}

pub struct MockTranscriber {
    name: &'static str,
    heard: Heard,
    probe: Probe,
}

#[async_trait]
impl Transcriber for MockTranscriber {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn transcribe(&self, wav: &[u8], _hint: &TranscriptionHint) -> Result<String> {
        self.probe.record(wav);
        match &self.heard {
            Heard::Text(text) => Ok((*text).to_string()),
            Heard::Fail => Err(Error::Stt(format!("{} unavailable", self.name))),
            Heard::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            }
        }
    }
}

pub struct MockGenerator {
    reply: Option<String>,
    probe: Probe,
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &'static str {
        "mock-llm"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.probe.record(prompt.as_bytes());
        self.reply
            .clone()
            .ok_or_else(|| Error::Llm("model offline".to_string()))
    }
}

/// How a scripted speech provider behaves
#[derive(Clone)]
pub enum Voice {
    Chunks(Vec<Vec<u8>>),
    /// Provider rejects the request
    Reject,
    /// Stream yields one chunk then errors
    BreakMidStream,
}

pub struct MockSpeech {
    voice: Voice,
    probe: Probe,
}

#[async_trait]
impl SpeechProvider for MockSpeech {
    fn name(&self) -> &'static str {
        "mock-tts"
    }

    async fn stream(&self, text: &str) -> Result<ChunkStream> {
        self.probe.record(text.as_bytes());
        match &self.voice {
            Voice::Chunks(chunks) => Ok(stream::iter(chunks.clone().into_iter().map(Ok)).boxed()),
            Voice::Reject => Err(Error::Tts("quota exceeded".to_string())),
            Voice::BreakMidStream => Ok(stream::iter(vec![
                Ok(b"ID3partial".to_vec()),
                Err(Error::Tts("connection reset".to_string())),
            ])
            .boxed()),
        }
    }
}

/// What the scripted microphone returns
#[derive(Clone)]
pub enum Captured {
    Sample(AudioSample),
    /// Listen timeout elapsed with silence
    Nothing,
    Fail,
}

pub struct MockSource {
    captured: Captured,
    probe: Probe,
}

#[async_trait]
impl AudioSource for MockSource {
    async fn capture(&self) -> Result<Option<AudioSample>> {
        self.probe.record(&[]);
        match &self.captured {
            Captured::Sample(sample) => Ok(Some(sample.clone())),
            Captured::Nothing => Ok(None),
            Captured::Fail => Err(Error::Audio("no input device available".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "mock-mic"
    }
}

/// One second of a 440 Hz tone, loud enough to count as speech
pub fn speech_sample(secs: f32) -> AudioSample {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let len = (SAMPLE_RATE as f32 * secs) as usize;
    #[allow(clippy::cast_precision_loss)]
    let samples = (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
        })
        .collect();
    AudioSample::new(samples, SAMPLE_RATE)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn silent_sample(secs: f32) -> AudioSample {
    AudioSample::new(vec![0.0; (SAMPLE_RATE as f32 * secs) as usize], SAMPLE_RATE)
}

/// Configures a [`Harness`]
pub struct HarnessBuilder {
    primary: Heard,
    fallback: Option<Heard>,
    reply: Option<String>,
    voice: Voice,
    captured: Captured,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            primary: Heard::Text("I would use a hash map."),
            fallback: Some(Heard::Text("fallback transcript")),
            reply: Some("Good. What is the time complexity of a lookup?".to_string()),
            voice: Voice::Chunks(vec![b"ID3".to_vec(), Vec::new(), b"fake-mp3-frames".to_vec()]),
            captured: Captured::Sample(speech_sample(1.0)),
        }
    }
}

impl HarnessBuilder {
    pub fn primary(mut self, heard: Heard) -> Self {
        self.primary = heard;
        self
    }

    pub fn fallback(mut self, heard: Heard) -> Self {
        self.fallback = Some(heard);
        self
    }

    pub fn no_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    pub fn reply(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self
    }

    pub fn generation_fails(mut self) -> Self {
        self.reply = None;
        self
    }

    pub fn voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    pub fn captured(mut self, captured: Captured) -> Self {
        self.captured = captured;
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path().join("audio"), "/static/audio").unwrap();

        let primary = Probe::default();
        let fallback = Probe::default();
        let generator = Probe::default();
        let speech = Probe::default();
        let source = Probe::default();

        let mut transcription = TranscriptionAdapter::new(
            Box::new(MockTranscriber {
                name: "primary",
                heard: self.primary,
                probe: primary.clone(),
            }),
            TranscriptionHint::default(),
            CALL_TIMEOUT,
        );
        if let Some(heard) = self.fallback {
            transcription = transcription.with_fallback(Box::new(MockTranscriber {
                name: "fallback",
                heard,
                probe: fallback.clone(),
            }));
        }

        let responder = ResponseGenerator::new(
            Box::new(MockGenerator {
                reply: self.reply,
                probe: generator.clone(),
            }),
            ReplyPolicy {
                persona_name: "CodeCoach".to_string(),
                max_sentences: 2,
                timeout: CALL_TIMEOUT,
            },
        );

        let synthesizer = Synthesizer::new(
            Box::new(MockSpeech {
                voice: self.voice,
                probe: speech.clone(),
            }),
            CALL_TIMEOUT,
        );

        let orchestrator = TurnOrchestrator::new(
            SessionRegistry::new(DEFAULT_TOPIC),
            transcription,
            responder,
            synthesizer,
            store,
        )
        .with_audio_source(Arc::new(MockSource {
            captured: self.captured,
            probe: source.clone(),
        }));

        let audio_dir = orchestrator.store().dir().to_path_buf();
        Harness {
            orchestrator,
            scripted: Scripted {
                primary,
                fallback,
                generator,
                speech,
                source,
                audio_dir,
                _dir: dir,
            },
        }
    }
}

/// Call counters for every scripted stage plus the temporary audio directory
pub struct Scripted {
    pub primary: Probe,
    pub fallback: Probe,
    pub generator: Probe,
    pub speech: Probe,
    pub source: Probe,
    audio_dir: PathBuf,
    _dir: TempDir,
}

impl Scripted {
    /// Names of the files written to the audio directory
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.audio_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// A pipeline wired to scripted providers and a temporary audio directory
pub struct Harness {
    pub orchestrator: TurnOrchestrator,
    scripted: Scripted,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Hand the orchestrator to a router while keeping the scripted doubles
    pub fn split(self) -> (TurnOrchestrator, Scripted) {
        (self.orchestrator, self.scripted)
    }
}

impl Deref for Harness {
    type Target = Scripted;

    fn deref(&self) -> &Scripted {
        &self.scripted
    }
}
