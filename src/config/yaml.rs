use serde::Deserialize;
use std::path::Path;

use super::{ClientConfig, ConfigError};
use crate::core::text::Granularity;
use crate::core::tts::ssml::{Rate, Volume};

/// Complete YAML configuration structure
///
/// All fields are optional. Values present here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// service:
///   wss_url: "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1"
///   voice_list_url: "https://speech.platform.bing.com/consumer/speech/synthesize/readaloud/voices/list"
///   trusted_client_token: "6A5AA1D4EAFF4E9FB37E23D68491D6F4"
///   max_frame_size: 65536
///   frame_margin: 50
///   channel_capacity: 16
///   connect_timeout_secs: 30
///
/// voice:
///   name: "Microsoft Server Speech Text to Speech Voice (en-US, AriaNeural)"
///   rate: "+10%"
///   volume: "-5%"
///   output_format: "audio-24khz-48kbitrate-mono-mp3"
///   word_boundary_enabled: true
///   sentence_boundary_enabled: false
///
/// splitter:
///   granularity: word
///   locales: ["en-US"]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub service: Option<ServiceYaml>,
    pub voice: Option<VoiceYaml>,
    pub splitter: Option<SplitterYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServiceYaml {
    pub wss_url: Option<String>,
    pub voice_list_url: Option<String>,
    pub trusted_client_token: Option<String>,
    pub max_frame_size: Option<usize>,
    pub frame_margin: Option<usize>,
    pub channel_capacity: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceYaml {
    pub name: Option<String>,
    pub rate: Option<Rate>,
    pub volume: Option<Volume>,
    pub output_format: Option<String>,
    pub word_boundary_enabled: Option<bool>,
    pub sentence_boundary_enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SplitterYaml {
    pub granularity: Option<Granularity>,
    pub locales: Option<Vec<String>>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed,
    /// including out-of-range rate or volume values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Overrides fields of `config` with the values present in this file.
    pub fn apply(self, config: &mut ClientConfig) {
        if let Some(service) = self.service {
            if let Some(v) = service.wss_url {
                config.wss_url = v;
            }
            if let Some(v) = service.voice_list_url {
                config.voice_list_url = v;
            }
            if let Some(v) = service.trusted_client_token {
                config.trusted_client_token = v;
            }
            if let Some(v) = service.max_frame_size {
                config.max_frame_size = v;
            }
            if let Some(v) = service.frame_margin {
                config.frame_margin = v;
            }
            if let Some(v) = service.channel_capacity {
                config.channel_capacity = v;
            }
            if let Some(v) = service.connect_timeout_secs {
                config.connect_timeout_secs = v;
            }
        }

        if let Some(voice) = self.voice {
            if let Some(v) = voice.name {
                config.voice = v;
            }
            if let Some(v) = voice.rate {
                config.rate = v;
            }
            if let Some(v) = voice.volume {
                config.volume = v;
            }
            if let Some(v) = voice.output_format {
                config.output_format = v;
            }
            if let Some(v) = voice.word_boundary_enabled {
                config.word_boundary_enabled = v;
            }
            if let Some(v) = voice.sentence_boundary_enabled {
                config.sentence_boundary_enabled = v;
            }
        }

        if let Some(splitter) = self.splitter {
            if let Some(v) = splitter.granularity {
                config.granularity = v;
            }
            if let Some(v) = splitter.locales {
                config.locales = v;
            }
        }
    }
}
