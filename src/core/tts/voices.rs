//! Voice catalogue.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use super::VOICE_LIST_HEADERS;

#[derive(Debug, Error)]
pub enum VoiceListError {
    #[error("Invalid voice list URL: {0}")]
    InvalidUrl(String),

    #[error("Voice list request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Cannot get correct voice list response from the server (status {status}): {body}")]
    Status { status: u16, body: String },
}

/// A voice offered by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Voice {
    /// Full name, usable as the SSML voice name.
    pub name: String,
    pub short_name: String,
    pub gender: String,
    pub locale: String,
    #[serde(default)]
    pub suggested_codec: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub voice_tag: VoiceTag,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceTag {
    #[serde(default)]
    pub content_categories: Vec<String>,
    #[serde(default)]
    pub voice_personalities: Vec<String>,
}

/// Fetches the voice catalogue.
pub async fn list_voices(
    client: &Client,
    voice_list_url: &str,
    trusted_client_token: &str,
) -> Result<Vec<Voice>, VoiceListError> {
    let mut url =
        Url::parse(voice_list_url).map_err(|e| VoiceListError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("trustedclienttoken", trusted_client_token);

    let mut request = client.get(url);
    for (name, value) in VOICE_LIST_HEADERS {
        request = request.header(*name, *value);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), "Voice list request failed");
        return Err(VoiceListError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let voices: Vec<Voice> = response.json().await?;
    debug!(count = voices.len(), "Fetched voice list");
    Ok(voices)
}
