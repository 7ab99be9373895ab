//! Voice I/O
//!
//! Handles microphone capture, utterance detection, WAV conversion, and
//! playback. Transcription and synthesis live in `stt` and `tts`.

mod capture;
mod detector;
mod listen;
mod playback;
mod sample;

pub use capture::AudioCapture;
pub use detector::{DetectorState, SpeechDetector};
pub use listen::{AudioSource, DisabledSource, ListenStep, Listener, MicrophoneSource};
pub use playback::{AudioPlayback, DecodedAudio, decode_mp3, play_mp3_blocking};
pub use sample::{AudioSample, SAMPLE_RATE, SILENCE_THRESHOLD, rms, samples_to_wav};
