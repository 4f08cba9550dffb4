//! Speech output
//!
//! A [`Speaker`] reads replies aloud through a [`SpeechEngine`]. Calls
//! return once playback has finished, so the next prompt is never taken
//! while the assistant is still talking.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{Config, SpeechEngineKind};
use crate::voice::{AudioPlayback, TextToSpeech};
use crate::{Error, Result};

/// Local synthesis programs tried in order, with their extra arguments
const LOCAL_CANDIDATES: &[(&str, &[&str])] = &[
    ("espeak-ng", &[]),
    ("espeak", &[]),
    ("say", &[]),
    ("spd-say", &["-w"]),
];

/// Turns text into audible speech
#[async_trait(?Send)]
pub trait SpeechEngine {
    /// Speak `text`, returning when playback is done
    async fn say(&mut self, text: &str) -> Result<()>;
}

/// Speech through a synthesis program installed on this machine
#[derive(Debug, Clone)]
pub struct LocalSpeech {
    program: PathBuf,
    args: Vec<String>,
}

impl LocalSpeech {
    /// Find a synthesis program on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if none of the known programs are installed
    pub fn detect() -> Result<Self> {
        for (name, args) in LOCAL_CANDIDATES {
            if let Ok(program) = which::which(name) {
                tracing::debug!(program = %program.display(), "found speech program");
                return Ok(Self {
                    program,
                    args: args.iter().map(ToString::to_string).collect(),
                });
            }
        }

        Err(Error::Tts(
            "no speech program found (install espeak-ng or set speech.command)".to_string(),
        ))
    }

    /// Use a configured command line such as `"espeak-ng -s 140"`
    ///
    /// The text to speak is passed as the final argument.
    ///
    /// # Errors
    ///
    /// Returns error if the command is empty or not on `PATH`
    pub fn from_command(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| Error::Config("speech command is empty".to_string()))?;
        let program = which::which(name)
            .map_err(|e| Error::Tts(format!("speech command {name}: {e}")))?;

        Ok(Self {
            program,
            args: parts.map(str::to_string).collect(),
        })
    }

    #[must_use]
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

#[async_trait(?Send)]
impl SpeechEngine for LocalSpeech {
    async fn say(&mut self, text: &str) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            return Err(Error::Tts(format!(
                "{} exited with code {code}: {}",
                self.program.display(),
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Speech through a remote TTS API, played on the default output device
pub struct RemoteSpeech {
    tts: TextToSpeech,
    playback: AudioPlayback,
}

impl RemoteSpeech {
    #[must_use]
    pub const fn new(tts: TextToSpeech, playback: AudioPlayback) -> Self {
        Self { tts, playback }
    }
}

#[async_trait(?Send)]
impl SpeechEngine for RemoteSpeech {
    async fn say(&mut self, text: &str) -> Result<()> {
        let mp3 = self.tts.synthesize(text).await?;
        tracing::debug!(bytes = mp3.len(), "speech synthesized");
        self.playback.play_mp3(&mp3)
    }
}

/// Speaks replies, skipping empty ones
pub struct Speaker {
    engine: Box<dyn SpeechEngine>,
}

impl Speaker {
    #[must_use]
    pub fn new(engine: Box<dyn SpeechEngine>) -> Self {
        Self { engine }
    }

    /// Build the speaker selected by configuration
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be set up
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine: Box<dyn SpeechEngine> = match config.speech.engine {
            SpeechEngineKind::Local => {
                let local = match &config.speech.command {
                    Some(command) => LocalSpeech::from_command(command)?,
                    None => LocalSpeech::detect()?,
                };
                tracing::info!(program = %local.program().display(), "using local speech");
                Box::new(local)
            }
            SpeechEngineKind::OpenAi => {
                let tts = TextToSpeech::new(
                    config.credential(),
                    config.speech.tts_model.clone(),
                    config.speech.tts_voice.clone(),
                    config.speech.tts_speed,
                    config.api_base_url.clone(),
                )?;
                tracing::info!(model = %config.speech.tts_model, "using remote speech");
                Box::new(RemoteSpeech::new(tts, AudioPlayback::new()?))
            }
        };

        Ok(Self::new(engine))
    }

    /// Speak `text` if there is any
    ///
    /// Engine failures are logged and swallowed.
    pub async fn speak(&mut self, text: Option<&str>) {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            tracing::debug!("nothing to speak");
            return;
        };

        if let Err(e) = self.engine.say(text).await {
            tracing::warn!(error = %e, "speech output failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    struct Recording {
        spoken: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    #[async_trait(?Send)]
    impl SpeechEngine for Recording {
        async fn say(&mut self, text: &str) -> Result<()> {
            self.spoken.borrow_mut().push(text.to_string());
            if self.fail {
                Err(Error::Tts("speaker unplugged".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn speaker(fail: bool) -> (Speaker, Rc<RefCell<Vec<String>>>) {
        let spoken = Rc::new(RefCell::new(Vec::new()));
        let engine = Recording {
            spoken: Rc::clone(&spoken),
            fail,
        };
        (Speaker::new(Box::new(engine)), spoken)
    }

    #[tokio::test]
    async fn test_empty_text_skips_engine() {
        let (mut speaker, spoken) = speaker(false);

        speaker.speak(None).await;
        speaker.speak(Some("")).await;
        speaker.speak(Some("  \n")).await;

        assert!(spoken.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_speaks_text() {
        let (mut speaker, spoken) = speaker(false);
        speaker.speak(Some("Drink some water.")).await;
        assert_eq!(*spoken.borrow(), vec!["Drink some water.".to_string()]);
    }

    #[tokio::test]
    async fn test_engine_failure_is_not_fatal() {
        let (mut speaker, spoken) = speaker(true);
        speaker.speak(Some("Hello")).await;
        speaker.speak(Some("Still here")).await;
        assert_eq!(spoken.borrow().len(), 2);
    }

    #[test]
    fn test_unknown_command() {
        assert!(LocalSpeech::from_command("no-such-speech-program-here").is_err());
        assert!(matches!(
            LocalSpeech::from_command("   "),
            Err(Error::Config(_))
        ));
    }
}
