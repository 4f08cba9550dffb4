//! Spoken prompts via microphone and remote recognition

use std::time::Duration;

use async_trait::async_trait;

use super::{PromptEvent, PromptSource, normalize};
use crate::Result;
use crate::config::Config;
use crate::voice::{AudioCapture, PhraseDetector, SAMPLE_RATE, SpeechToText, samples_to_wav};

/// Interval between microphone buffer polls
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Listens for one phrase per prompt and transcribes it
pub struct VoicePrompt {
    capture: AudioCapture,
    detector: PhraseDetector,
    stt: SpeechToText,
}

impl VoicePrompt {
    /// Open the microphone and calibrate against ambient noise
    ///
    /// # Errors
    ///
    /// Returns error if no input device is available or the recognizer
    /// cannot be configured
    pub async fn new(config: &Config) -> Result<Self> {
        let stt = SpeechToText::new(
            config.credential(),
            config.voice.stt_model.clone(),
            config.api_base_url.clone(),
        )?;

        let mut capture = AudioCapture::new()?;
        let mut detector = PhraseDetector::new(
            config.voice.energy_threshold,
            config.voice.pause,
            SAMPLE_RATE,
        );

        capture.start()?;
        tokio::time::sleep(config.voice.calibration).await;
        let threshold = detector.calibrate(&capture.drain(), SAMPLE_RATE);
        tracing::info!(energy_threshold = threshold, "calibrated for ambient noise");

        Ok(Self {
            capture,
            detector,
            stt,
        })
    }

    async fn listen(&mut self) -> Vec<f32> {
        self.detector.reset();
        let _ = self.capture.drain();

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let chunk = self.capture.drain();
            if !chunk.is_empty() && self.detector.process(&chunk) {
                return self.detector.take_phrase();
            }
        }
    }
}

#[async_trait(?Send)]
impl PromptSource for VoicePrompt {
    async fn next_prompt(&mut self) -> PromptEvent {
        println!("Listening...");

        let phrase = self.listen().await;
        tracing::debug!(samples = phrase.len(), "phrase captured");

        match samples_to_wav(&phrase, SAMPLE_RATE) {
            Ok(wav) => recognize(&self.stt, &wav).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode phrase");
                PromptEvent::NoInput
            }
        }
    }
}

/// Transcribe one recorded phrase into a prompt event
///
/// Recognition failures and empty transcripts are reported on the console
/// and yield [`PromptEvent::NoInput`].
pub async fn recognize(stt: &SpeechToText, wav: &[u8]) -> PromptEvent {
    match stt.transcribe(wav).await {
        Ok(transcript) => {
            let event = normalize(&transcript);
            match &event {
                PromptEvent::Prompt(text) => println!("Speech input: {text}"),
                PromptEvent::NoInput | PromptEvent::EndOfInput => println!("No speech detected."),
            }
            event
        }
        Err(e) => {
            println!("Could not request results: {e}");
            PromptEvent::NoInput
        }
    }
}
