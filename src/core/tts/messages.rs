//! Wire formats of the read-aloud synthesis protocol.
//!
//! # Outbound
//!
//! Each chunk of text travels as a *request group*: a `speech.config` request
//! followed by an `ssml` request, both text frames sharing one timestamp. The
//! group's correlation id is carried in the `X-RequestId` header of the SSML
//! request and echoed by every response.
//!
//! ```text
//! X-Timestamp:<ts>Z\r\nContent-Type:application/json; charset=utf-8\r\nPath:speech.config\r\n\r\n<json>\r\n
//! X-RequestId:<id>\r\nContent-Type:application/ssml+xml\r\nX-Timestamp:<ts>Z\r\nPath:ssml\r\n\r\n<ssml>
//! ```
//!
//! # Inbound
//!
//! - Text frames: CRLF-separated `Key:Value` headers, a blank line, a JSON body.
//! - Binary frames: `[u16 BE header length][header block][raw audio bytes]`.

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

// =============================================================================
// Close Codes
// =============================================================================

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// No status code was present in the close frame.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// The connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// A text frame could not be decoded.
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;
/// The client hit an internal error.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// A binary frame arrived outside of a turn.
pub const CLOSE_UNEXPECTED_BINARY: u16 = 4000;
/// A binary frame was too short to hold the header length prefix.
pub const CLOSE_HEADER_LENGTH_MISSING: u16 = 4001;
/// A binary frame was shorter than its declared header block.
pub const CLOSE_HEADER_CONTENT_MISSING: u16 = 4002;
/// A response carried a correlation id other than the outstanding one.
pub const CLOSE_UNEXPECTED_REQUEST_ID: u16 = 4003;

// =============================================================================
// Errors
// =============================================================================

/// Inbound frames that break the protocol contract.
///
/// Each violation closes the connection with its own code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("Unexpected binary message")]
    UnexpectedBinaryFrame,

    #[error("Invalid binary message format: header length missing")]
    HeaderLengthMissing,

    #[error("Invalid binary message format: header content missing (declared {declared} bytes, {available} available)")]
    HeaderContentMissing { declared: usize, available: usize },

    #[error("Unexpected X-RequestId {received:?}, expected {expected:?}")]
    UnexpectedRequestId {
        expected: Option<String>,
        received: Option<String>,
    },
}

impl ProtocolViolation {
    /// Close code sent to the server.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::UnexpectedBinaryFrame => CLOSE_UNEXPECTED_BINARY,
            Self::HeaderLengthMissing => CLOSE_HEADER_LENGTH_MISSING,
            Self::HeaderContentMissing { .. } => CLOSE_HEADER_CONTENT_MISSING,
            Self::UnexpectedRequestId { .. } => CLOSE_UNEXPECTED_REQUEST_ID,
        }
    }

    /// Close reason sent to the server.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::UnexpectedBinaryFrame => "Unexpected binary message.",
            Self::HeaderLengthMissing => "Invalid binary message format. Header length missing.",
            Self::HeaderContentMissing { .. } => {
                "Invalid binary message format. Header content missing."
            }
            Self::UnexpectedRequestId { .. } => "Unexpected X-RequestId.",
        }
    }
}

/// A frame that does not follow the wire format, such as a text frame without
/// `headers + CRLF CRLF + JSON`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Malformed message: {0}")]
pub struct MalformedFrame(pub String);

// =============================================================================
// Ids and Timestamps
// =============================================================================

/// Generates a correlation or connection id: a UUIDv4 without dashes.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Formats `time` the way the service expects in `X-Timestamp`.
///
/// Example: `Fri Oct 17 2025 09:30:00 GMT+0000 (Coordinated Universal Time)`.
pub fn format_timestamp(time: OffsetDateTime) -> String {
    let format = format_description!(
        "[weekday repr:short] [month repr:short] [day] [year] [hour]:[minute]:[second] GMT+0000 (Coordinated Universal Time)"
    );
    time.to_offset(time::UtcOffset::UTC)
        .format(format)
        .unwrap_or_default()
}

/// Current time, formatted with [`format_timestamp`].
pub fn timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

// =============================================================================
// Requests
// =============================================================================

/// Audio format used when none is configured.
pub const DEFAULT_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Synthesis settings sent in every `speech.config` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub output_format: String,
    pub word_boundary_enabled: bool,
    pub sentence_boundary_enabled: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            word_boundary_enabled: true,
            sentence_boundary_enabled: false,
        }
    }
}

impl SpeechConfig {
    /// JSON payload of the `speech.config` request.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "context": {
                "synthesis": {
                    "audio": {
                        "metadataoptions": {
                            "sentenceBoundaryEnabled": self.sentence_boundary_enabled,
                            "wordBoundaryEnabled": self.word_boundary_enabled,
                        },
                        "outputFormat": self.output_format,
                    }
                }
            }
        })
        .to_string()
    }
}

/// Builds the `speech.config` request.
pub fn speech_config_request(config: &SpeechConfig, timestamp: &str) -> String {
    format!(
        "X-Timestamp:{timestamp}Z\r\n\
         Content-Type:application/json; charset=utf-8\r\n\
         Path:speech.config\r\n\r\n\
         {}\r\n",
        config.to_json()
    )
}

/// Builds the `ssml` request carrying one SSML document.
pub fn ssml_request(ssml: &str, request_id: &str, timestamp: &str) -> String {
    format!(
        "X-RequestId:{request_id}\r\n\
         Content-Type:application/ssml+xml\r\n\
         X-Timestamp:{timestamp}Z\r\n\
         Path:ssml\r\n\r\n\
         {ssml}"
    )
}

/// A configuration request and a content request under one correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestGroup {
    pub id: String,
    pub requests: [String; 2],
}

impl RequestGroup {
    /// Builds a group for one SSML document with a fresh id and timestamp.
    pub fn new(ssml: &str, speech_config: &SpeechConfig) -> Self {
        Self::with_id(generate_id(), &timestamp(), ssml, speech_config)
    }

    pub fn with_id(id: String, timestamp: &str, ssml: &str, speech_config: &SpeechConfig) -> Self {
        let requests = [
            speech_config_request(speech_config, timestamp),
            ssml_request(ssml, &id, timestamp),
        ];
        Self { id, requests }
    }
}

/// Maps a stream of SSML documents to request groups, passing errors through.
pub fn make_request_groups<S, E>(
    ssml: S,
    speech_config: SpeechConfig,
) -> impl Stream<Item = Result<RequestGroup, E>>
where
    S: Stream<Item = Result<String, E>>,
{
    ssml.map_ok(move |document| RequestGroup::new(&document, &speech_config))
}

// =============================================================================
// Headers
// =============================================================================

/// Response headers, keyed by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    /// Parses a CRLF-separated block of `Key:Value` lines.
    ///
    /// Only the first colon separates key and value, so values may contain
    /// colons. Whitespace around both is trimmed and lines without a colon are
    /// skipped.
    pub fn parse(block: &str) -> Self {
        let entries = block
            .trim()
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        Self(entries)
    }

    /// Looks up a header, falling back to a case-insensitive match.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .or_else(|| {
                self.0
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.get("X-RequestId")
    }

    pub fn path(&self) -> Option<&str> {
        self.get("Path")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("Content-Type")
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.get("X-StreamId")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// `Path` header values of text responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Path {
    TurnStart,
    Response,
    TurnEnd,
    AudioMetadata,
}

impl Path {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TurnStart => "turn.start",
            Self::Response => "response",
            Self::TurnEnd => "turn.end",
            Self::AudioMetadata => "audio.metadata",
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Path {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turn.start" => Ok(Self::TurnStart),
            "response" => Ok(Self::Response),
            "turn.end" => Ok(Self::TurnEnd),
            "audio.metadata" => Ok(Self::AudioMetadata),
            other => Err(format!("Unknown Path: {other}")),
        }
    }
}

// =============================================================================
// Frame Decoding
// =============================================================================

/// Splits a text frame into headers and parsed JSON body.
pub fn decode_text_frame(frame: &str) -> Result<(Headers, serde_json::Value), MalformedFrame> {
    let (header_block, body) = frame
        .split_once("\r\n\r\n")
        .ok_or_else(|| MalformedFrame("missing header/body delimiter".to_string()))?;
    let body = serde_json::from_str(body)
        .map_err(|e| MalformedFrame(format!("invalid JSON body: {e}")))?;
    Ok((Headers::parse(header_block), body))
}

/// Splits a binary frame into headers and audio payload.
///
/// The payload is a zero-copy slice of `frame`.
pub fn decode_binary_frame(frame: Bytes) -> Result<(Headers, Bytes), ProtocolViolation> {
    if frame.len() < 2 {
        return Err(ProtocolViolation::HeaderLengthMissing);
    }
    let header_length = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let available = frame.len() - 2;
    if available < header_length {
        return Err(ProtocolViolation::HeaderContentMissing {
            declared: header_length,
            available,
        });
    }
    let header_end = 2 + header_length;
    let headers = Headers::parse(&String::from_utf8_lossy(&frame[2..header_end]));
    Ok((headers, frame.slice(header_end..)))
}

/// Encodes a binary frame. The inverse of [`decode_binary_frame`], used by test
/// servers and tools that replay captured sessions.
///
/// Fails when the header block does not fit the 16-bit length prefix.
pub fn encode_binary_frame(header_block: &str, payload: &[u8]) -> Result<Bytes, MalformedFrame> {
    let header_length = u16::try_from(header_block.len()).map_err(|_| {
        MalformedFrame(format!(
            "header block of {} bytes exceeds {} bytes",
            header_block.len(),
            u16::MAX
        ))
    })?;
    let mut frame = Vec::with_capacity(2 + header_block.len() + payload.len());
    frame.extend_from_slice(&header_length.to_be_bytes());
    frame.extend_from_slice(header_block.as_bytes());
    frame.extend_from_slice(payload);
    Ok(Bytes::from(frame))
}

// =============================================================================
// Messages
// =============================================================================

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A chunk of synthesized audio.
    Audio { headers: Headers, data: Bytes },
    /// A control message with its JSON body.
    Control {
        headers: Headers,
        body: serde_json::Value,
    },
}

impl Message {
    pub fn headers(&self) -> &Headers {
        match self {
            Self::Audio { headers, .. } | Self::Control { headers, .. } => headers,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio { .. })
    }

    /// Parsed `Path` of a control message.
    pub fn path(&self) -> Option<Path> {
        match self {
            Self::Control { headers, .. } => headers.path()?.parse().ok(),
            Self::Audio { .. } => None,
        }
    }

    /// Audio payload, if this is an audio message.
    pub fn audio(&self) -> Option<&Bytes> {
        match self {
            Self::Audio { data, .. } => Some(data),
            Self::Control { .. } => None,
        }
    }

    /// Decodes the body of a control message into `T`.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        match self {
            Self::Control { body, .. } => Some(T::deserialize(body)),
            Self::Audio { .. } => None,
        }
    }

    /// Boundaries reported by an `audio.metadata` message.
    pub fn boundaries(&self) -> Vec<WordBoundary> {
        if self.path() != Some(Path::AudioMetadata) {
            return Vec::new();
        }
        match self.decode_body::<MetadataBody>() {
            Some(Ok(body)) => body.metadata.into_iter().map(WordBoundary::from).collect(),
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// Response Bodies
// =============================================================================

/// Body of `turn.start`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TurnStartBody {
    pub context: ServiceContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceContext {
    #[serde(rename = "serviceTag")]
    pub service_tag: String,
}

/// Body of `response`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResponseBody {
    pub context: ServiceContext,
    pub audio: AudioStreamInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AudioStreamInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "streamId")]
    pub stream_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum BoundaryType {
    WordBoundary,
    SentenceBoundary,
    SessionEnd,
}

/// Body of `audio.metadata`.
#[derive(Debug, Clone, Deserialize)]
struct MetadataBody {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataEntry {
    #[serde(rename = "Type")]
    kind: BoundaryType,
    data: MetadataData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataData {
    #[serde(default)]
    offset: u64,
    #[serde(default)]
    duration: u64,
    #[serde(rename = "text", default)]
    text: Option<MetadataText>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataText {
    #[serde(default)]
    text: String,
    #[serde(default)]
    length: usize,
}

/// A timed boundary in the synthesized audio.
///
/// Offsets and durations are in 100-nanosecond ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordBoundary {
    pub kind: BoundaryType,
    pub offset: u64,
    pub duration: u64,
    pub text: String,
    pub length: usize,
}

impl From<MetadataEntry> for WordBoundary {
    fn from(entry: MetadataEntry) -> Self {
        let (text, length) = entry
            .data
            .text
            .map(|t| (t.text, t.length))
            .unwrap_or_default();
        Self {
            kind: entry.kind,
            offset: entry.data.offset,
            duration: entry.data.duration,
            text,
            length,
        }
    }
}
