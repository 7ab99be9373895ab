//! Captured audio samples and WAV conversion

use std::io::Cursor;
use std::time::Duration;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Window length used when scanning for speech energy
const ENERGY_WINDOW: Duration = Duration::from_millis(100);

/// RMS level below which a window counts as silence
pub const SILENCE_THRESHOLD: f32 = 0.01;

/// One captured utterance: mono `f32` samples in `[-1.0, 1.0]`
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioSample {
    /// Wrap mono samples captured at `sample_rate`
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback length of the sample
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// True when no 100ms window rises above [`SILENCE_THRESHOLD`]
    #[must_use]
    pub fn is_silent(&self) -> bool {
        let rate = usize::try_from(self.sample_rate).unwrap_or(usize::MAX);
        let window_ms = usize::try_from(ENERGY_WINDOW.as_millis()).unwrap_or(usize::MAX);
        let window = (rate.saturating_mul(window_ms) / 1000).max(1);
        !self
            .samples
            .chunks(window)
            .any(|chunk| rms(chunk) > SILENCE_THRESHOLD)
    }

    /// Encode as 16-bit mono WAV for STT APIs
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples, self.sample_rate)
    }

    /// Decode a WAV file, mixing multi-channel audio down to mono
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a readable WAV file
    #[allow(clippy::cast_precision_loss)]
    pub fn from_wav(bytes: &[u8]) -> Result<Self> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = int_scale(spec.bits_per_sample)?;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self::new(samples, spec.sample_rate))
    }
}

/// Full-scale magnitude of a signed integer sample of `bits` width
#[allow(clippy::cast_precision_loss)]
fn int_scale(bits: u16) -> Result<f32> {
    if bits == 0 || bits > 32 {
        return Err(Error::Audio(format!("unsupported WAV bit depth: {bits}")));
    }
    Ok((1_i64 << (bits - 1)) as f32)
}

/// Root-mean-square energy of a block of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    if sample_rate == 0 {
        return Err(Error::Audio("sample rate must be non-zero".to_string()));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(sample_i16)?;
        }

        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let sample = AudioSample::new(vec![0.0; 8000], SAMPLE_RATE);
        assert_eq!(sample.duration(), Duration::from_millis(500));

        let empty = AudioSample::new(Vec::new(), 0);
        assert_eq!(empty.duration(), Duration::ZERO);
    }

    #[test]
    fn test_silence_detection() {
        let silent = AudioSample::new(vec![0.001; 16000], SAMPLE_RATE);
        assert!(silent.is_silent());

        let mut samples = vec![0.0; 16000];
        for s in &mut samples[4000..6000] {
            *s = 0.2;
        }
        assert!(!AudioSample::new(samples, SAMPLE_RATE).is_silent());
    }

    #[test]
    fn test_rms_of_constant() {
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert!(rms(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_int_scale_bounds() {
        assert!((int_scale(16).unwrap() - 32768.0).abs() < f32::EPSILON);
        assert!((int_scale(8).unwrap() - 128.0).abs() < f32::EPSILON);
        assert!(int_scale(32).is_ok());

        for bits in [0, 33, 40, u16::MAX] {
            assert!(matches!(int_scale(bits), Err(Error::Audio(_))));
        }
    }

    #[test]
    fn test_short_window_rate_still_scans() {
        let sample = AudioSample::new(vec![0.5; 4], 1);
        assert!(!sample.is_silent());
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(samples_to_wav(&[0.1], 0).is_err());
    }

    #[test]
    fn test_stereo_wav_downmixed() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..4 {
                writer.write_sample(16384_i16).unwrap();
                writer.write_sample(0_i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let sample = AudioSample::from_wav(&cursor.into_inner()).unwrap();
        assert_eq!(sample.sample_rate(), 8000);
        assert_eq!(sample.samples().len(), 4);
        assert!((sample.samples()[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_garbage_is_not_wav() {
        assert!(AudioSample::from_wav(b"definitely not audio").is_err());
    }
}
