//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Decoded PCM ready for the output device
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
}

impl AudioPlayback {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self { device })
    }

    /// Play an MP3 file's bytes, blocking until done
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let audio = decode_mp3(mp3_data)?;
        self.play(&audio)
    }

    /// Play mono samples, blocking until done
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the stream
    pub fn play(&self, audio: &DecodedAudio) -> Result<()> {
        if audio.samples.is_empty() {
            return Ok(());
        }

        let config = self.output_config(audio.sample_rate)?;
        let channels = usize::from(config.channels.max(1));

        let samples: Arc<[f32]> = Arc::from(audio.samples.as_slice());
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            self.device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                position.store(pos + 1, Ordering::Relaxed);
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (samples.len() as u64 * 1000) / u64::from(audio.sample_rate.max(1));
        let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }

        // let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = samples.len(), "playback complete");

        Ok(())
    }

    /// Pick an output config at `sample_rate`, mono if available
    fn output_config(&self, sample_rate: u32) -> Result<StreamConfig> {
        let rate = SampleRate(sample_rate);
        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        };

        let configs: Vec<_> = self
            .device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .collect();

        configs
            .iter()
            .find(|c| supports(c, 1))
            .or_else(|| configs.iter().find(|c| supports(c, 2)))
            .map(|c| c.clone().with_sample_rate(rate).config())
            .ok_or_else(|| Error::Audio(format!("no output config for {sample_rate} Hz")))
    }
}

/// Play MP3 bytes on a blocking thread
///
/// The output device is opened on that thread, since cpal streams are not
/// `Send`.
///
/// # Errors
///
/// Returns error if decoding or playback fails
pub async fn play_mp3_blocking(mp3_data: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_mp3(&mp3_data))
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not decodable MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or_default();
                }
                let channels = frame.channels.max(1);
                samples.extend(frame.data.chunks(channels).map(|chunk| {
                    let sum: f32 = chunk.iter().map(|&s| f32::from(s) / 32768.0).sum();
                    #[allow(clippy::cast_precision_loss)]
                    let mono = sum / chunk.len() as f32;
                    mono
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 contained no frames".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_empty_input() {
        assert!(decode_mp3(&[]).is_err());
    }
}
