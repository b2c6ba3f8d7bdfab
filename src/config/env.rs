use std::env;
use std::fmt::Display;
use std::str::FromStr;

use super::{ClientConfig, ConfigError};

/// Reads `key`, treating unset and empty values alike.
fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    var(key)
        .map(|raw| {
            raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw}: {e}"),
            })
        })
        .transpose()
}

fn parse_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    var(key)
        .map(|raw| match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw}: expected true or false"),
            }),
        })
        .transpose()
}

/// Overrides fields of `config` with the `EDGE_TTS_*` variables that are set.
pub(super) fn apply_env(config: &mut ClientConfig) -> Result<(), ConfigError> {
    if let Some(v) = var("EDGE_TTS_WSS_URL") {
        config.wss_url = v;
    }
    if let Some(v) = var("EDGE_TTS_VOICE_LIST_URL") {
        config.voice_list_url = v;
    }
    if let Some(v) = var("EDGE_TTS_TRUSTED_CLIENT_TOKEN") {
        config.trusted_client_token = v;
    }
    if let Some(v) = parse("EDGE_TTS_MAX_FRAME_SIZE")? {
        config.max_frame_size = v;
    }
    if let Some(v) = parse("EDGE_TTS_FRAME_MARGIN")? {
        config.frame_margin = v;
    }
    if let Some(v) = var("EDGE_TTS_VOICE") {
        config.voice = v;
    }
    if let Some(v) = parse("EDGE_TTS_RATE")? {
        config.rate = v;
    }
    if let Some(v) = parse("EDGE_TTS_VOLUME")? {
        config.volume = v;
    }
    if let Some(v) = var("EDGE_TTS_OUTPUT_FORMAT") {
        config.output_format = v;
    }
    if let Some(v) = parse_bool("EDGE_TTS_WORD_BOUNDARY")? {
        config.word_boundary_enabled = v;
    }
    if let Some(v) = parse_bool("EDGE_TTS_SENTENCE_BOUNDARY")? {
        config.sentence_boundary_enabled = v;
    }
    if let Some(v) = parse("EDGE_TTS_GRANULARITY")? {
        config.granularity = v;
    }
    if let Some(v) = var("EDGE_TTS_LOCALES") {
        config.locales = v
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(v) = parse("EDGE_TTS_CHANNEL_CAPACITY")? {
        config.channel_capacity = v;
    }
    if let Some(v) = parse("EDGE_TTS_CONNECT_TIMEOUT")? {
        config.connect_timeout_secs = v;
    }
    Ok(())
}
