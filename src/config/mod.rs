//! Client configuration.
//!
//! Values are layered with the following priority:
//!
//! 1. YAML file (when one is given)
//! 2. Environment variables (`EDGE_TTS_*`, `.env` is loaded by the binary)
//! 3. Built-in defaults
//!
//! # Environment variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `EDGE_TTS_WSS_URL` | `wss_url` |
//! | `EDGE_TTS_VOICE_LIST_URL` | `voice_list_url` |
//! | `EDGE_TTS_TRUSTED_CLIENT_TOKEN` | `trusted_client_token` |
//! | `EDGE_TTS_MAX_FRAME_SIZE` | `max_frame_size` |
//! | `EDGE_TTS_FRAME_MARGIN` | `frame_margin` |
//! | `EDGE_TTS_VOICE` | `voice` |
//! | `EDGE_TTS_RATE` | `rate` |
//! | `EDGE_TTS_VOLUME` | `volume` |
//! | `EDGE_TTS_OUTPUT_FORMAT` | `output_format` |
//! | `EDGE_TTS_WORD_BOUNDARY` | `word_boundary_enabled` |
//! | `EDGE_TTS_SENTENCE_BOUNDARY` | `sentence_boundary_enabled` |
//! | `EDGE_TTS_GRANULARITY` | `granularity` |
//! | `EDGE_TTS_LOCALES` | `locales` (comma-separated) |
//! | `EDGE_TTS_CHANNEL_CAPACITY` | `channel_capacity` |
//! | `EDGE_TTS_CONNECT_TIMEOUT` | `connect_timeout_secs` |

mod env;
mod yaml;

pub use yaml::{ServiceYaml, SplitterYaml, VoiceYaml, YamlConfig};

use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::core::text::Granularity;
use crate::core::tts::messages::{DEFAULT_OUTPUT_FORMAT, SpeechConfig};
use crate::core::tts::provider::calculate_max_message_size;
use crate::core::tts::ssml::{DEFAULT_VOICE, Rate, SsmlOptions, Volume};
use crate::core::tts::{
    TRUSTED_CLIENT_TOKEN, VOICE_LIST_URL, WEBSOCKET_MARGIN, WEBSOCKET_MAX_SIZE, WSS_URL,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the client needs to talk to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    // Service endpoints
    pub wss_url: String,
    pub voice_list_url: String,
    pub trusted_client_token: String,

    // Framing
    pub max_frame_size: usize,
    pub frame_margin: usize,

    // Voice
    pub voice: String,
    pub rate: Rate,
    pub volume: Volume,

    // Speech config
    pub output_format: String,
    pub word_boundary_enabled: bool,
    pub sentence_boundary_enabled: bool,

    // Splitting
    pub granularity: Granularity,
    pub locales: Vec<String>,

    // Session
    /// Messages buffered between the session task and the consumer.
    pub channel_capacity: usize,
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            wss_url: WSS_URL.to_string(),
            voice_list_url: VOICE_LIST_URL.to_string(),
            trusted_client_token: TRUSTED_CLIENT_TOKEN.to_string(),
            max_frame_size: WEBSOCKET_MAX_SIZE,
            frame_margin: WEBSOCKET_MARGIN,
            voice: DEFAULT_VOICE.to_string(),
            rate: Rate::default(),
            volume: Volume::default(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            word_boundary_enabled: true,
            sentence_boundary_enabled: false,
            granularity: Granularity::default(),
            locales: Vec::new(),
            channel_capacity: 16,
            connect_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Loads defaults overridden by `EDGE_TTS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads environment configuration, then applies the YAML file on top.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = YamlConfig::from_file(path)?;
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        yaml.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("wss_url", &self.wss_url, &["ws", "wss"])?;
        check_url("voice_list_url", &self.voice_list_url, &["http", "https"])?;

        if self.trusted_client_token.trim().is_empty() {
            return Err(invalid("trusted_client_token", "must not be empty"));
        }
        if self.voice.trim().is_empty() {
            return Err(invalid("voice", "must not be empty"));
        }
        if self.output_format.trim().is_empty() {
            return Err(invalid("output_format", "must not be empty"));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("channel_capacity", "must be at least 1"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(invalid("connect_timeout_secs", "must be at least 1"));
        }

        calculate_max_message_size(self.max_frame_size, self.frame_margin, &self.ssml_options())
            .map_err(|e| {
                ConfigError::Invalid(format!(
                    "max_frame_size {} with frame_margin {} leaves no room for text: {e}",
                    self.max_frame_size, self.frame_margin
                ))
            })?;
        Ok(())
    }

    pub fn ssml_options(&self) -> SsmlOptions {
        SsmlOptions {
            voice: self.voice.clone(),
            rate: self.rate,
            volume: self.volume,
        }
    }

    pub fn speech_config(&self) -> SpeechConfig {
        SpeechConfig {
            output_format: self.output_format.clone(),
            word_boundary_enabled: self.word_boundary_enabled,
            sentence_boundary_enabled: self.sentence_boundary_enabled,
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn check_url(key: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| invalid(key, format!("{value}: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(
            key,
            format!("scheme '{}' is not one of {}", url.scheme(), schemes.join(", ")),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    const ENV_VARS: &[&str] = &[
        "EDGE_TTS_WSS_URL",
        "EDGE_TTS_VOICE_LIST_URL",
        "EDGE_TTS_TRUSTED_CLIENT_TOKEN",
        "EDGE_TTS_MAX_FRAME_SIZE",
        "EDGE_TTS_FRAME_MARGIN",
        "EDGE_TTS_VOICE",
        "EDGE_TTS_RATE",
        "EDGE_TTS_VOLUME",
        "EDGE_TTS_OUTPUT_FORMAT",
        "EDGE_TTS_WORD_BOUNDARY",
        "EDGE_TTS_SENTENCE_BOUNDARY",
        "EDGE_TTS_GRANULARITY",
        "EDGE_TTS_LOCALES",
        "EDGE_TTS_CHANNEL_CAPACITY",
        "EDGE_TTS_CONNECT_TIMEOUT",
    ];

    fn cleanup_env_vars() {
        for key in ENV_VARS {
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    fn set_env(key: &str, value: &str) {
        unsafe {
            std::env::set_var(key, value);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert_ok!(config.validate());
        assert_eq!(config.max_frame_size, 65536);
        assert_eq!(config.frame_margin, 50);
        assert_eq!(config.voice, DEFAULT_VOICE);
        assert_eq!(config.channel_capacity, 16);
        assert_eq!(config.speech_config(), SpeechConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();
        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        cleanup_env_vars();
        set_env("EDGE_TTS_VOICE", "en-US-AriaNeural");
        set_env("EDGE_TTS_RATE", "-10%");
        set_env("EDGE_TTS_VOLUME", "+20%");
        set_env("EDGE_TTS_GRANULARITY", "word");
        set_env("EDGE_TTS_LOCALES", "en-US, en-GB");
        set_env("EDGE_TTS_WORD_BOUNDARY", "false");
        set_env("EDGE_TTS_CHANNEL_CAPACITY", "4");

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.voice, "en-US-AriaNeural");
        assert_eq!(config.rate.percent(), -10);
        assert_eq!(config.volume.percent(), 20);
        assert_eq!(config.granularity, Granularity::Word);
        assert_eq!(config.locales, vec!["en-US", "en-GB"]);
        assert!(!config.word_boundary_enabled);
        assert_eq!(config.channel_capacity, 4);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_value() {
        cleanup_env_vars();
        set_env("EDGE_TTS_RATE", "fast");
        let err = ClientConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "EDGE_TTS_RATE"));

        cleanup_env_vars();
        set_env("EDGE_TTS_MAX_FRAME_SIZE", "lots");
        assert!(ClientConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();
        set_env("EDGE_TTS_VOICE", "env-voice");
        set_env("EDGE_TTS_CONNECT_TIMEOUT", "5");

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
service:
  wss_url: "ws://127.0.0.1:9000/tts"
  max_frame_size: 8192

voice:
  name: "yaml-voice"
  rate: "+25%"

splitter:
  granularity: sentence
  locales: ["de-DE"]
"#;
        fs::write(&config_path, yaml_content).unwrap();

        let config = ClientConfig::from_file(&config_path).unwrap();
        assert_eq!(config.voice, "yaml-voice");
        assert_eq!(config.rate.percent(), 25);
        assert_eq!(config.wss_url, "ws://127.0.0.1:9000/tts");
        assert_eq!(config.max_frame_size, 8192);
        assert_eq!(config.granularity, Granularity::Sentence);
        assert_eq!(config.locales, vec!["de-DE"]);
        // Not in YAML, so the environment value stays
        assert_eq!(config.connect_timeout_secs, 5);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing() {
        cleanup_env_vars();
        let err = ClientConfig::from_file(Path::new("/nonexistent/edge.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_invalid_rate() {
        cleanup_env_vars();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "voice:\n  rate: \"+500%\"\n").unwrap();
        assert!(matches!(
            ClientConfig::from_file(&config_path),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ClientConfig {
            wss_url: "https://example.com".to_string(),
            ..Default::default()
        };
        assert_err!(config.validate());

        let config = ClientConfig {
            channel_capacity: 0,
            ..Default::default()
        };
        assert_err!(config.validate());

        let config = ClientConfig {
            voice: "  ".to_string(),
            ..Default::default()
        };
        assert_err!(config.validate());

        let config = ClientConfig {
            max_frame_size: 200,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
