//! WebSocket session driver.
//!
//! One connection carries a sequence of request groups. The driver sends a
//! group, relays every response of that group's turn to the output stream and
//! sends the next group after `turn.end`. When the group source is exhausted it
//! closes the connection normally.
//!
//! ```text
//! client                               server
//!   | -- speech.config + ssml (id A) -->  |
//!   | <-- turn.start (A) ---------------- |
//!   | <-- response / audio / metadata --- |
//!   | <-- turn.end (A) ------------------ |
//!   | -- speech.config + ssml (id B) -->  |
//!   |              ...                    |
//!   | -- close 1000 --------------------> |
//! ```
//!
//! The driver runs in its own task and hands results over a bounded channel, so
//! a slow consumer stops the driver from reading further frames. Dropping the
//! [`MessageStream`] closes the connection.

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use http::{HeaderName, HeaderValue};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::messages::{
    CLOSE_ABNORMAL, CLOSE_INTERNAL_ERROR, CLOSE_INVALID_PAYLOAD, CLOSE_NO_STATUS, CLOSE_NORMAL,
    MalformedFrame, Message, Path, ProtocolViolation, RequestGroup, decode_binary_frame,
    decode_text_frame, generate_id,
};
use super::{TRUSTED_CLIENT_TOKEN, WSS_HEADERS};
use crate::config::ClientConfig;
use crate::core::text::SplitError;

/// Reason sent with the normal close once every group has been answered.
const DONE_REASON: &str = "No values to be sent.";

/// Reason sent with the normal close when the consumer went away.
const DROPPED_REASON: &str = "Output stream dropped.";

pub type SessionResult<T> = Result<T, SessionError>;

/// Client WebSocket connection used by [`communicate`].
pub type EdgeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Error Types
// =============================================================================

/// Ways a synthesis session can fail.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timed out after {0} seconds")]
    Timeout(u64),

    #[error("WebSocket error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    #[error(transparent)]
    MalformedFrame(#[from] MalformedFrame),

    #[error("Unreachable protocol state: {0}")]
    UnreachableProtocolState(String),

    #[error("Connection closed with code {code}: {reason}")]
    Closed { code: u16, reason: String },

    #[error("Request source failed: {0}")]
    Split(#[from] SplitError),
}

impl From<Infallible> for SessionError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl From<url::ParseError> for SessionError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}

impl SessionError {
    /// Close code and reason the client sends when aborting with this error.
    ///
    /// `None` when the connection is already gone or was never established.
    pub fn close_frame(&self) -> Option<(u16, String)> {
        match self {
            Self::ProtocolViolation(v) => Some((v.close_code(), v.close_reason().to_string())),
            Self::MalformedFrame(_) => Some((CLOSE_INVALID_PAYLOAD, "Malformed message.".to_string())),
            Self::UnreachableProtocolState(_) => {
                Some((CLOSE_INTERNAL_ERROR, "Unreachable protocol state.".to_string()))
            }
            Self::Split(_) => Some((CLOSE_INTERNAL_ERROR, "Request source failed.".to_string())),
            _ => None,
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Builds the connection URL with the client token and a fresh connection id.
pub fn connection_url(base: &str, trusted_client_token: &str) -> SessionResult<Url> {
    let mut url = Url::parse(base)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(SessionError::InvalidUrl(format!(
                "unsupported scheme '{other}', expected ws or wss"
            )));
        }
    }
    url.query_pairs_mut()
        .append_pair("TrustedClientToken", trusted_client_token)
        .append_pair("ConnectionId", &generate_id());
    Ok(url)
}

/// Opens the WebSocket connection described by `config`.
pub async fn connect(config: &ClientConfig) -> SessionResult<EdgeSocket> {
    let token = if config.trusted_client_token.is_empty() {
        TRUSTED_CLIENT_TOKEN
    } else {
        config.trusted_client_token.as_str()
    };
    let url = connection_url(&config.wss_url, token)?;

    let mut request = url.as_str().into_client_request()?;
    for (name, value) in WSS_HEADERS {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SessionError::ConnectionFailed(format!("invalid header name: {e}")))?;
        request
            .headers_mut()
            .insert(name, HeaderValue::from_static(*value));
    }

    debug!(host = url.host_str().unwrap_or_default(), "Connecting to speech service");
    let secs = config.connect_timeout_secs;
    let (socket, response) = timeout(Duration::from_secs(secs), connect_async(request))
        .await
        .map_err(|_| SessionError::Timeout(secs))?
        .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
    info!(status = %response.status(), "Connected to speech service");
    Ok(socket)
}

/// Connects and drives a session over `groups`.
///
/// Connection errors are returned directly. Everything after the handshake
/// arrives through the returned stream.
pub async fn communicate<G, E>(config: &ClientConfig, groups: G) -> SessionResult<MessageStream>
where
    G: Stream<Item = Result<RequestGroup, E>> + Send + Unpin + 'static,
    E: Into<SessionError> + Send + 'static,
{
    let socket = connect(config).await?;
    Ok(communicate_over(socket, groups, config.channel_capacity))
}

/// Drives a session over an already open socket.
///
/// `capacity` bounds how many messages may wait for the consumer.
pub fn communicate_over<S, G, E>(socket: S, groups: G, capacity: usize) -> MessageStream
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>>
        + Sink<WsMessage, Error = tungstenite::Error>
        + Send
        + Unpin
        + 'static,
    G: Stream<Item = Result<RequestGroup, E>> + Send + Unpin + 'static,
    E: Into<SessionError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let driver = SessionDriver {
        socket,
        groups,
        tx,
        request_id: None,
        audio_expected: false,
        closing: false,
    };
    tokio::spawn(driver.run());
    MessageStream { rx }
}

// =============================================================================
// Output
// =============================================================================

/// Messages of one session, in arrival order.
///
/// Ends after a normal close, or after the first error.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<SessionResult<Message>>,
}

impl Stream for MessageStream {
    type Item = SessionResult<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Why the driver stopped early.
enum Stop {
    OutputDropped,
    Failed(SessionError),
}

impl From<SessionError> for Stop {
    fn from(e: SessionError) -> Self {
        Self::Failed(e)
    }
}

impl From<ProtocolViolation> for Stop {
    fn from(e: ProtocolViolation) -> Self {
        Self::Failed(e.into())
    }
}

impl From<MalformedFrame> for Stop {
    fn from(e: MalformedFrame) -> Self {
        Self::Failed(e.into())
    }
}

impl From<tungstenite::Error> for Stop {
    fn from(e: tungstenite::Error) -> Self {
        Self::Failed(e.into())
    }
}

struct SessionDriver<S, G> {
    socket: S,
    groups: G,
    tx: mpsc::Sender<SessionResult<Message>>,
    /// Correlation id of the outstanding group.
    request_id: Option<String>,
    /// Set between `turn.start` and `turn.end`.
    audio_expected: bool,
    /// Set once a close frame has been sent.
    closing: bool,
}

impl<S, G, E> SessionDriver<S, G>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>>
        + Sink<WsMessage, Error = tungstenite::Error>
        + Unpin,
    G: Stream<Item = Result<RequestGroup, E>> + Unpin,
    E: Into<SessionError>,
{
    async fn run(mut self) {
        match self.drive().await {
            Ok(()) => debug!("Session finished"),
            Err(Stop::OutputDropped) => {
                info!("Output stream dropped, closing connection");
                self.close(CLOSE_NORMAL, DROPPED_REASON).await;
            }
            Err(Stop::Failed(err)) => {
                match err.close_frame() {
                    Some((code, reason)) => {
                        warn!(code, "Aborting session: {}", err);
                        self.close(code, &reason).await;
                    }
                    None => warn!("Session failed: {}", err),
                }
                let _ = self.tx.send(Err(err)).await;
            }
        }
    }

    async fn drive(&mut self) -> Result<(), Stop> {
        if !self.send_next_group().await? {
            self.close(CLOSE_NORMAL, DONE_REASON).await;
        }

        loop {
            let frame = tokio::select! {
                biased;

                _ = self.tx.closed() => return Err(Stop::OutputDropped),

                frame = self.socket.next() => frame,
            };

            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(
                    tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake),
                ))
                | None => return closed(CLOSE_ABNORMAL, String::new()),
                Some(Err(e)) => return Err(e.into()),
            };

            match frame {
                WsMessage::Text(text) => self.on_text(text.as_str()).await?,
                WsMessage::Binary(data) => self.on_binary(data).await?,
                // tungstenite queues the pong itself and flushes it on the next read
                WsMessage::Ping(_) => trace!("Received ping"),
                WsMessage::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    return closed(code, reason);
                }
                WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }

    async fn on_text(&mut self, frame: &str) -> Result<(), Stop> {
        let (headers, body) = decode_text_frame(frame)?;
        self.check_request_id(headers.request_id())?;

        let path = headers.path().map(str::to_string);
        self.emit(Message::Control { headers, body }).await?;

        match path.as_deref().map(str::parse::<Path>) {
            Some(Ok(Path::TurnStart)) => {
                debug!(request_id = ?self.request_id, "Turn started");
                self.audio_expected = true;
            }
            Some(Ok(Path::TurnEnd)) => {
                debug!(request_id = ?self.request_id, "Turn ended");
                self.audio_expected = false;
                if !self.send_next_group().await? {
                    self.close(CLOSE_NORMAL, DONE_REASON).await;
                }
            }
            Some(Ok(Path::Response | Path::AudioMetadata)) => {}
            Some(Err(_)) | None => {
                return Err(SessionError::UnreachableProtocolState(format!(
                    "unexpected Path header {path:?}"
                ))
                .into());
            }
        }
        Ok(())
    }

    async fn on_binary(&mut self, frame: Bytes) -> Result<(), Stop> {
        if !self.audio_expected {
            return Err(ProtocolViolation::UnexpectedBinaryFrame.into());
        }
        let (headers, data) = decode_binary_frame(frame)?;
        self.check_request_id(headers.request_id())?;
        trace!(bytes = data.len(), "Received audio");
        self.emit(Message::Audio { headers, data }).await
    }

    fn check_request_id(&self, received: Option<&str>) -> Result<(), ProtocolViolation> {
        match (received, self.request_id.as_deref()) {
            (Some(received), Some(expected)) if received == expected => Ok(()),
            (received, expected) => Err(ProtocolViolation::UnexpectedRequestId {
                expected: expected.map(str::to_string),
                received: received.map(str::to_string),
            }),
        }
    }

    /// Pulls the next group and sends it. Returns `false` when the source is done.
    async fn send_next_group(&mut self) -> Result<bool, Stop> {
        let next = tokio::select! {
            biased;

            _ = self.tx.closed() => return Err(Stop::OutputDropped),

            next = self.groups.next() => next,
        };

        let RequestGroup { id, requests } = match next {
            Some(Ok(group)) => group,
            Some(Err(e)) => return Err(Stop::Failed(e.into())),
            None => return Ok(false),
        };

        debug!(request_id = %id, "Sending request group");
        self.request_id = Some(id);
        for request in requests {
            self.socket.send(WsMessage::Text(request.into())).await?;
        }
        Ok(true)
    }

    async fn emit(&mut self, message: Message) -> Result<(), Stop> {
        self.tx
            .send(Ok(message))
            .await
            .map_err(|_| Stop::OutputDropped)
    }

    async fn close(&mut self, code: u16, reason: &str) {
        if self.closing {
            return;
        }
        self.closing = true;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        debug!(code, reason, "Sending close frame");
        if let Err(e) = self.socket.send(WsMessage::Close(Some(frame))).await {
            debug!("Failed to send close frame: {}", e);
        }
    }
}

/// Outcome of a close initiated by the server or the transport.
///
/// 1000 is a normal end. 1006 (no close frame) is also treated as a normal end,
/// since the service is known to drop the connection after the last turn.
fn closed(code: u16, reason: String) -> Result<(), Stop> {
    match code {
        CLOSE_NORMAL | CLOSE_ABNORMAL => {
            debug!(code, "Connection closed");
            Ok(())
        }
        _ => Err(SessionError::Closed { code, reason }.into()),
    }
}
