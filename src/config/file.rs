//! TOML configuration file loading
//!
//! Supports `~/.config/carebot/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarebotConfigFile {
    /// Chat completion settings
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Assistant persona
    #[serde(default)]
    pub persona: PersonaFileConfig,

    /// Microphone and recognition settings
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Speech output settings
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Conversation log settings
    #[serde(default)]
    pub log: LogFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-3.5-turbo")
    pub model: Option<String>,

    /// API base URL (e.g. "https://api.openai.com")
    pub base_url: Option<String>,

    /// Output token ceiling per reply
    pub output_limit: Option<u32>,

    /// Token usage that triggers eviction
    pub input_limit: Option<u32>,

    /// Pairs evicted at a time
    pub clear_pairs: Option<usize>,
}

/// Persona configuration
#[derive(Debug, Default, Deserialize)]
pub struct PersonaFileConfig {
    /// System turn establishing the persona
    pub system_prompt: Option<String>,

    /// Optional user turn with standing instructions
    pub priming_prompt: Option<String>,
}

/// Voice input configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Starting RMS energy threshold (0.0 to 1.0)
    pub energy_threshold: Option<f32>,

    /// Silence that ends a phrase, in seconds
    pub pause_secs: Option<f64>,

    /// Ambient noise calibration time, in seconds
    pub calibration_secs: Option<f64>,
}

/// Speech output configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// "local" or "openai"
    pub engine: Option<String>,

    /// Local synthesis command (e.g. "espeak-ng")
    pub command: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// Conversation log configuration
#[derive(Debug, Default, Deserialize)]
pub struct LogFileConfig {
    /// Path of the conversation log
    pub path: Option<String>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `CarebotConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> CarebotConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return CarebotConfigFile::default();
    };

    if !path.exists() {
        return CarebotConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CarebotConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CarebotConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed or has unknown sections
pub fn parse_config(content: &str) -> crate::Result<CarebotConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/carebot/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("carebot").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_file() {
        let config = parse_config(
            r#"
            [llm]
            model = "gpt-4o-mini"
            clear_pairs = 3

            [speech]
            engine = "openai"
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.llm.clear_pairs, Some(3));
        assert_eq!(config.llm.input_limit, None);
        assert_eq!(config.speech.engine.as_deref(), Some("openai"));
        assert!(config.persona.system_prompt.is_none());
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        assert!(parse_config("[channels]\nslack = true\n").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config_file(Some(&dir.path().join("absent.toml")));
        assert!(config.llm.model.is_none());
    }
}
