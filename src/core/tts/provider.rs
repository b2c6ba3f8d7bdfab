//! High-level synthesis client.
//!
//! [`EdgeTts`] runs the full pipeline for a stream of text fragments:
//!
//! ```text
//! fragments -> replace_incompatible -> escape_xml -> split_stream
//!           -> make_ssml -> make_request_groups -> communicate
//! ```
//!
//! Each fragment is sanitized and escaped on its own, so an entity reference
//! never spans two fragments.

use futures::{Stream, StreamExt, TryStreamExt, stream};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::messages::{
    Message, Path, RequestGroup, WordBoundary, generate_id, make_request_groups, ssml_request,
    timestamp,
};
use super::session::{self, MessageStream, SessionError, SessionResult};
use super::ssml::{SsmlOptions, make_ssml};
use super::voices::{self, Voice, VoiceListError};
use crate::config::{ClientConfig, ConfigError};
use crate::core::text::{
    ByteBudget, SplitOptions, SplitResult, escape_xml, replace_incompatible, split_stream,
};

/// Largest chunk of escaped text that still fits one request frame.
///
/// The frame budget minus the margin minus the bytes of an SSML request around
/// an empty chunk.
pub fn calculate_max_message_size(
    max_frame_size: usize,
    margin: usize,
    ssml_options: &SsmlOptions,
) -> SplitResult<ByteBudget> {
    let overhead = ssml_request(&make_ssml("", ssml_options), &generate_id(), &timestamp()).len();
    let budget = max_frame_size as i64 - margin as i64 - overhead as i64;
    ByteBudget::try_from(budget)
}

/// Synthesis client bound to one configuration.
#[derive(Debug, Clone)]
pub struct EdgeTts {
    config: ClientConfig,
    http: Client,
}

impl EdgeTts {
    /// Validates `config` and builds the client.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn max_message_size(&self) -> SplitResult<ByteBudget> {
        calculate_max_message_size(
            self.config.max_frame_size,
            self.config.frame_margin,
            &self.config.ssml_options(),
        )
    }

    /// Splitter options for escaped text under the frame budget.
    pub fn split_options(&self) -> SplitResult<SplitOptions> {
        Ok(SplitOptions::with_budget(self.max_message_size()?)
            .with_granularity(self.config.granularity)
            .with_locales(self.config.locales.iter().cloned())
            .escaped(true))
    }

    /// Connects and sends caller-built request groups.
    pub async fn communicate<G, E>(&self, groups: G) -> SessionResult<MessageStream>
    where
        G: Stream<Item = Result<RequestGroup, E>> + Send + Unpin + 'static,
        E: Into<SessionError> + Send + 'static,
    {
        session::communicate(&self.config, groups).await
    }

    /// Synthesizes a stream of raw text fragments.
    ///
    /// Fragments are pulled lazily as the session asks for the next request.
    /// Splitting failures arrive on the returned stream as
    /// [`SessionError::Split`].
    pub async fn synthesize<S>(&self, fragments: S) -> SessionResult<MessageStream>
    where
        S: Stream + Send + 'static,
        S::Item: AsRef<str>,
    {
        let options = self.split_options()?;
        let ssml_options = self.config.ssml_options();
        debug!(
            budget = options.budget.get(),
            granularity = %options.granularity,
            voice = %ssml_options.voice,
            "Starting synthesis"
        );

        let escaped = fragments.map(|fragment| escape_xml(&replace_incompatible(fragment.as_ref())));
        let documents =
            split_stream(escaped, options).map_ok(move |chunk| make_ssml(&chunk, &ssml_options));
        let groups = make_request_groups(documents, self.config.speech_config());
        self.communicate(Box::pin(groups)).await
    }

    /// Synthesizes one piece of text.
    pub async fn synthesize_text(&self, text: &str) -> SessionResult<MessageStream> {
        self.synthesize(stream::iter([text.to_string()])).await
    }

    pub async fn list_voices(&self) -> Result<Vec<Voice>, VoiceListError> {
        voices::list_voices(
            &self.http,
            &self.config.voice_list_url,
            &self.config.trusted_client_token,
        )
        .await
    }
}

/// Everything a session produced, gathered in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Synthesis {
    /// Concatenated audio payloads.
    pub audio: Vec<u8>,
    pub boundaries: Vec<WordBoundary>,
    /// Number of completed turns.
    pub turns: usize,
}

impl Synthesis {
    /// Drains `messages`, stopping at the first error.
    pub async fn collect(mut messages: MessageStream) -> SessionResult<Self> {
        let mut synthesis = Self::default();
        while let Some(message) = messages.next().await {
            synthesis.push(&message?);
        }
        info!(
            audio_bytes = synthesis.audio.len(),
            turns = synthesis.turns,
            "Synthesis complete"
        );
        Ok(synthesis)
    }

    pub fn push(&mut self, message: &Message) {
        match message {
            Message::Audio { data, .. } => self.audio.extend_from_slice(data),
            Message::Control { .. } => match message.path() {
                Some(Path::TurnEnd) => self.turns += 1,
                Some(Path::AudioMetadata) => self.boundaries.extend(message.boundaries()),
                _ => {}
            },
        }
    }
}
