//! Phrase detection
//!
//! Splits the microphone stream into spoken phrases using RMS energy: a
//! phrase starts when a chunk rises above the energy threshold and ends once
//! the speaker has been quiet for the pause duration.

use std::time::Duration;

use super::capture::rms;

/// Ratio of speech energy to ambient energy used by calibration
const AMBIENT_RATIO: f32 = 1.5;

/// Fraction of the previous threshold kept per second of calibration audio
const CALIBRATION_DAMPING: f32 = 0.15;

/// Chunk size used when calibrating (samples)
const CALIBRATION_CHUNK: usize = 1024;

/// Minimum spoken duration for a phrase
const MIN_PHRASE: Duration = Duration::from_millis(300);

/// State of the phrase detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Speech detected, accumulating the phrase
    Speaking,
}

/// Detects complete spoken phrases in audio
pub struct PhraseDetector {
    energy_threshold: f32,
    pause_samples: usize,
    min_phrase_samples: usize,
    state: DetectorState,
    phrase_buffer: Vec<f32>,
    silence_counter: usize,
}

impl PhraseDetector {
    /// Create a detector
    ///
    /// # Arguments
    ///
    /// * `energy_threshold` - RMS level above which a chunk counts as speech
    /// * `pause` - silence that ends a phrase
    /// * `sample_rate` - sample rate of the processed audio
    #[must_use]
    pub fn new(energy_threshold: f32, pause: Duration, sample_rate: u32) -> Self {
        tracing::debug!(
            energy_threshold,
            pause_ms = pause.as_millis(),
            "phrase detector initialized"
        );

        Self {
            energy_threshold,
            pause_samples: samples_for(pause, sample_rate),
            min_phrase_samples: samples_for(MIN_PHRASE, sample_rate),
            state: DetectorState::Idle,
            phrase_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Adjust the energy threshold to the ambient noise in `ambient`
    ///
    /// Each chunk pulls the threshold towards `1.5 x` its energy, weighted
    /// by how much audio the chunk covers. Returns the new threshold.
    #[allow(clippy::cast_precision_loss)]
    pub fn calibrate(&mut self, ambient: &[f32], sample_rate: u32) -> f32 {
        let seconds_per_chunk = CALIBRATION_CHUNK as f32 / sample_rate as f32;
        let damping = CALIBRATION_DAMPING.powf(seconds_per_chunk);

        for chunk in ambient.chunks(CALIBRATION_CHUNK) {
            let target = rms(chunk) * AMBIENT_RATIO;
            self.energy_threshold = self
                .energy_threshold
                .mul_add(damping, target * (1.0 - damping));
        }

        tracing::debug!(
            energy_threshold = self.energy_threshold,
            samples = ambient.len(),
            "calibrated for ambient noise"
        );

        self.energy_threshold
    }

    /// Process audio samples
    ///
    /// Returns true once a phrase followed by a pause has been captured
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = rms(samples);
        let is_speech = energy > self.energy_threshold;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.phrase_buffer.clear();
                    self.phrase_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected");
                }
            }
            DetectorState::Speaking => {
                self.phrase_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                tracing::trace!(
                    buffer_len = self.phrase_buffer.len(),
                    silence = self.silence_counter,
                    is_speech,
                    energy,
                    "speaking state"
                );

                if self.silence_counter > self.pause_samples {
                    if self.spoken_samples() >= self.min_phrase_samples {
                        tracing::debug!(samples = self.phrase_buffer.len(), "phrase complete");
                        return true;
                    }

                    tracing::trace!("too short for a phrase, resetting");
                    self.reset();
                }
            }
        }

        false
    }

    /// Whether a complete phrase is waiting to be taken
    #[must_use]
    pub fn is_phrase_complete(&self) -> bool {
        self.state == DetectorState::Speaking
            && self.silence_counter > self.pause_samples
            && self.spoken_samples() >= self.min_phrase_samples
    }

    /// Take the phrase buffer and return to idle
    pub fn take_phrase(&mut self) -> Vec<f32> {
        let phrase = std::mem::take(&mut self.phrase_buffer);
        self.reset();
        phrase
    }

    /// Accumulated phrase audio
    #[must_use]
    pub fn phrase_buffer(&self) -> &[f32] {
        &self.phrase_buffer
    }

    /// Reset detector to idle state
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.phrase_buffer.clear();
        self.silence_counter = 0;
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    #[must_use]
    pub const fn energy_threshold(&self) -> f32 {
        self.energy_threshold
    }

    fn spoken_samples(&self) -> usize {
        self.phrase_buffer.len().saturating_sub(self.silence_counter)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    #[test]
    fn test_samples_for() {
        assert_eq!(samples_for(Duration::from_millis(500), RATE), 8000);
        assert_eq!(samples_for(MIN_PHRASE, RATE), 4800);
    }

    #[test]
    fn test_calibration_moves_towards_ambient() {
        let mut detector = PhraseDetector::new(0.5, Duration::from_millis(500), RATE);
        let ambient = vec![0.02f32; 8000];

        let threshold = detector.calibrate(&ambient, RATE);
        assert!(threshold < 0.5);
        assert!(threshold > 0.03);
        assert!((detector.energy_threshold() - threshold).abs() < f32::EPSILON);
    }

    #[test]
    fn test_calibration_with_no_audio_keeps_threshold() {
        let mut detector = PhraseDetector::new(0.12, Duration::from_millis(500), RATE);
        assert!((detector.calibrate(&[], RATE) - 0.12).abs() < f32::EPSILON);
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut detector = PhraseDetector::new(0.05, Duration::from_millis(500), RATE);

        assert!(!detector.process(&vec![0.3f32; 800]));
        assert_eq!(detector.state(), DetectorState::Speaking);

        assert!(!detector.process(&vec![0.0f32; 9000]));
        assert_eq!(detector.state(), DetectorState::Idle);
        assert!(detector.phrase_buffer().is_empty());
    }
}
