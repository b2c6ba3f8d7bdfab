//! Client for the read-aloud speech synthesis service.
//!
//! - [`ssml`] wraps text chunks in the SSML envelope.
//! - [`messages`] frames requests and decodes responses.
//! - [`session`] drives one WebSocket connection over a sequence of requests.
//! - [`voices`] fetches the voice catalogue.
//! - [`provider`] ties text preparation, splitting and the session together.
//!
//! # Example
//!
//! ```rust,ignore
//! use edge_speech::{ClientConfig, EdgeTts};
//! use futures::StreamExt;
//!
//! let tts = EdgeTts::new(ClientConfig::default())?;
//! let mut messages = tts.synthesize_text("Hello there. General Kenobi.").await?;
//! while let Some(message) = messages.next().await {
//!     if let Some(audio) = message?.audio() {
//!         // append to an mp3 file
//!     }
//! }
//! ```

pub mod messages;
pub mod provider;
pub mod session;
pub mod ssml;
pub mod voices;


pub use messages::{
    BoundaryType, Headers, MalformedFrame, Message, Path, ProtocolViolation, RequestGroup,
    SpeechConfig, WordBoundary, make_request_groups, speech_config_request, ssml_request,
};
pub use provider::{EdgeTts, Synthesis, calculate_max_message_size};
pub use session::{MessageStream, SessionError, SessionResult, communicate, communicate_over};
pub use ssml::{DEFAULT_VOICE, Rate, SsmlOptions, Volume, make_ssml};
pub use voices::{Voice, VoiceListError, list_voices};

/// Client token accepted by the service.
pub const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

/// Synthesis WebSocket endpoint, without query parameters.
pub const WSS_URL: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";

/// Origin the service expects on the WebSocket handshake.
pub const WSS_ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.77 Safari/537.36 Edg/91.0.864.41";

/// Extra headers sent with the WebSocket handshake.
pub const WSS_HEADERS: &[(&str, &str)] = &[
    ("Origin", WSS_ORIGIN),
    ("Pragma", "no-cache"),
    ("Cache-Control", "no-cache"),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("User-Agent", USER_AGENT),
];

/// Voice catalogue endpoint, without query parameters.
pub const VOICE_LIST_URL: &str =
    "https://speech.platform.bing.com/consumer/speech/synthesize/readaloud/voices/list";

/// Headers sent with the voice catalogue request.
///
/// No `Accept-Encoding`: the HTTP client is built without decompression.
pub const VOICE_LIST_HEADERS: &[(&str, &str)] = &[
    ("Authority", "speech.platform.bing.com"),
    (
        "Sec-CH-UA",
        "\" Not;A Brand\";v=\"99\", \"Microsoft Edge\";v=\"91\", \"Chromium\";v=\"91\"",
    ),
    ("Sec-CH-UA-Mobile", "?0"),
    ("User-Agent", USER_AGENT),
    ("Accept", "*/*"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Dest", "empty"),
    ("Accept-Language", "en-US,en;q=0.9"),
];

/// Largest text frame the service accepts, in bytes.
pub const WEBSOCKET_MAX_SIZE: usize = 1 << 16;

/// Bytes kept free in every frame.
pub const WEBSOCKET_MARGIN: usize = 50;
