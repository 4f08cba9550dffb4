//! Voice processing module
//!
//! Microphone capture, phrase detection, speech recognition, and the audio
//! side of speech output.

mod capture;
mod phrase;
mod playback;
mod stt;
mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE, rms, samples_to_wav};
pub use phrase::{DetectorState, PhraseDetector};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;
