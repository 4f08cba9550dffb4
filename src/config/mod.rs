//! Configuration management for carebot
//!
//! Values are layered env > TOML file > defaults. The API credential only
//! comes from the environment (`API_KEY`, falling back to `OPENAI_API_KEY`).

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::conversation::{TokenBudget, Turn};
use crate::{Error, Result};

use self::file::CarebotConfigFile;

/// Default persona
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an elderly caretaker";

/// Default standing instruction sent as the second priming turn
pub const DEFAULT_PRIMING_PROMPT: &str =
    "Treat me as an elderly and give me short and simple responses";

/// Carebot configuration
#[derive(Debug)]
pub struct Config {
    /// API credential for completion, STT and remote TTS
    pub api_key: SecretString,

    /// API base URL override
    pub api_base_url: Option<String>,

    /// LLM model identifier
    pub model: String,

    /// Output token ceiling per reply
    pub output_limit: u32,

    /// Token usage that triggers eviction
    pub input_limit: u32,

    /// Pairs evicted at a time
    pub clear_pairs: usize,

    /// Path of the append-only conversation log
    pub conversation_log: PathBuf,

    /// Persona and priming
    pub persona: PersonaConfig,

    /// Voice input configuration
    pub voice: VoiceConfig,

    /// Speech output configuration
    pub speech: SpeechConfig,
}

/// Persona configuration
#[derive(Debug, Clone)]
pub struct PersonaConfig {
    /// System turn
    pub system_prompt: String,

    /// Optional second priming turn, sent as a user turn
    pub priming_prompt: Option<String>,
}

impl PersonaConfig {
    /// Priming turns that open every conversation
    #[must_use]
    pub fn priming_turns(&self) -> Vec<Turn> {
        let mut turns = vec![Turn::system(self.system_prompt.clone())];
        if let Some(priming) = &self.priming_prompt {
            turns.push(Turn::user(priming.clone()));
        }
        turns
    }
}

/// Voice input configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// Starting RMS energy threshold before calibration
    pub energy_threshold: f32,

    /// Silence that ends a phrase
    pub pause: Duration,

    /// Ambient noise calibration time
    pub calibration: Duration,
}

/// Which speech engine to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEngineKind {
    /// A synthesis program on this machine
    Local,
    /// OpenAI-compatible TTS API played through the speakers
    OpenAi,
}

impl FromStr for SpeechEngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" | "remote" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown speech engine: {other}"))),
        }
    }
}

/// Speech output configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Engine selection
    pub engine: SpeechEngineKind,

    /// Local synthesis command; found on `PATH` when `None`
    pub command: Option<String>,

    /// TTS model for the remote engine
    pub tts_model: String,

    /// TTS voice for the remote engine
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// `config_path` overrides the standard config file location.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or a value is invalid
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path);
        Self::from_sources(&fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or a value is invalid
    pub fn from_sources(
        fc: &CarebotConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_key = env("API_KEY")
            .or_else(|| env("OPENAI_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("API_KEY environment variable is not set".to_string())
            })?;

        let api_base_url = env("CAREBOT_BASE_URL").or_else(|| fc.llm.base_url.clone());

        let model = env("CAREBOT_MODEL")
            .or_else(|| fc.llm.model.clone())
            .unwrap_or_else(|| "gpt-3.5-turbo".to_string());

        let output_limit = parse_env(&env, "CAREBOT_OUTPUT_LIMIT")?
            .or(fc.llm.output_limit)
            .unwrap_or(50);
        let input_limit = parse_env(&env, "CAREBOT_INPUT_LIMIT")?
            .or(fc.llm.input_limit)
            .unwrap_or(3000);
        let clear_pairs = parse_env(&env, "CAREBOT_CLEAR_PAIRS")?
            .or(fc.llm.clear_pairs)
            .unwrap_or(2);

        if clear_pairs == 0 {
            return Err(Error::Config("clear_pairs must be at least 1".to_string()));
        }

        let conversation_log = env("CAREBOT_LOG_PATH")
            .or_else(|| fc.log.path.clone())
            .map_or_else(default_log_path, PathBuf::from);

        let persona = PersonaConfig {
            system_prompt: fc
                .persona
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            priming_prompt: match &fc.persona.priming_prompt {
                // An empty string in the file disables the second priming turn
                Some(p) if p.trim().is_empty() => None,
                Some(p) => Some(p.clone()),
                None => Some(DEFAULT_PRIMING_PROMPT.to_string()),
            },
        };

        let voice = VoiceConfig {
            stt_model: env("CAREBOT_STT_MODEL")
                .or_else(|| fc.voice.stt_model.clone())
                .unwrap_or_else(|| "whisper-1".to_string()),
            energy_threshold: fc.voice.energy_threshold.unwrap_or(0.12),
            pause: seconds(fc.voice.pause_secs.unwrap_or(0.5), "voice.pause_secs")?,
            calibration: seconds(
                fc.voice.calibration_secs.unwrap_or(0.5),
                "voice.calibration_secs",
            )?,
        };

        let engine = env("CAREBOT_SPEECH_ENGINE")
            .or_else(|| fc.speech.engine.clone())
            .map_or(Ok(SpeechEngineKind::Local), |s| s.parse())?;

        let speech = SpeechConfig {
            engine,
            command: env("CAREBOT_SPEECH_COMMAND").or_else(|| fc.speech.command.clone()),
            tts_model: fc
                .speech
                .tts_model
                .clone()
                .unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: fc
                .speech
                .tts_voice
                .clone()
                .unwrap_or_else(|| "alloy".to_string()),
            tts_speed: fc.speech.tts_speed.unwrap_or(1.0).clamp(0.25, 4.0),
        };

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base_url,
            model,
            output_limit,
            input_limit,
            clear_pairs,
            conversation_log,
            persona,
            voice,
            speech,
        })
    }

    /// A fresh handle on the API credential for one client
    #[must_use]
    pub fn credential(&self) -> SecretString {
        SecretString::from(self.api_key.expose_secret().to_owned())
    }

    /// Eviction settings for the conversation buffer
    #[must_use]
    pub const fn budget(&self) -> TokenBudget {
        TokenBudget {
            input_limit: self.input_limit,
            clear_pairs: self.clear_pairs,
        }
    }
}

/// Default conversation log: `~/.local/share/carebot/conversation.log` on Linux
#[must_use]
pub fn default_log_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("conversation.log"),
        |d| d.data_dir().join("carebot").join("conversation.log"),
    )
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {v}")))
        })
        .transpose()
}

fn seconds(value: f64, name: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| Error::Config(format!("{name} must be a non-negative number of seconds")))
}
