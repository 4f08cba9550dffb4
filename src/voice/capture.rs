//! Microphone capture
//!
//! Opens the default input device as 16 kHz mono and collects samples from
//! the device callback into a shared buffer that the prompt loop drains.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Capture rate expected by the speech recognizer
pub const SAMPLE_RATE: u32 = 16000;

type SampleBuffer = Arc<Mutex<Vec<f32>>>;

/// Live microphone input
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    pending: SampleBuffer,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if there is no input device or it cannot record mono
    /// audio at [`SAMPLE_RATE`]
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let config = device
            .supported_input_configs()
            .map_err(audio_error)?
            .find(records_speech)
            .ok_or_else(|| Error::Audio("microphone cannot record 16 kHz mono".to_string()))?
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            pending: Arc::default(),
            stream: None,
        })
    }

    /// Begin recording; a no-op while already recording
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let sink = Arc::clone(&self.pending);
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut pending) = sink.lock() {
                        pending.extend_from_slice(data);
                    }
                },
                |err| tracing::error!(error = %err, "microphone stream error"),
                None,
            )
            .map_err(audio_error)?;

        stream.play().map_err(audio_error)?;
        self.stream = Some(stream);
        tracing::debug!("recording");
        Ok(())
    }

    /// Stop recording and release the stream
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("recording stopped");
        }
    }

    /// Samples recorded since the last drain
    #[must_use]
    pub fn drain(&self) -> Vec<f32> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn records_speech(range: &SupportedStreamConfigRange) -> bool {
    range.channels() == 1
        && (range.min_sample_rate()..=range.max_sample_rate()).contains(&SampleRate(SAMPLE_RATE))
}

#[allow(clippy::needless_pass_by_value)]
fn audio_error(e: impl std::fmt::Display) -> Error {
    Error::Audio(e.to_string())
}

/// Encode mono samples as a 16-bit PCM WAV file
///
/// Samples outside `-1.0..=1.0` are clipped.
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav = std::io::Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut wav, spec).map_err(audio_error)?;
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(pcm).map_err(audio_error)?;
    }
    writer.finalize().map_err(audio_error)?;

    Ok(wav.into_inner())
}

/// Root-mean-square energy of a block of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    (energy / samples.len() as f32).sqrt()
}
