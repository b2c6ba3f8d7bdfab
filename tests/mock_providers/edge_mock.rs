//! WebSocket mock of the read-aloud synthesis service
//!
//! Every SSML request is answered with a full turn. The audio payload echoes the
//! text inside `<prosody>`, so tests can check that chunks reassemble into the
//! original input.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

/// Scripted server behavior
#[derive(Clone, Debug)]
pub struct MockBehavior {
    /// Audio frames per turn, the echo is spread across them
    pub audio_frames: usize,
    /// Send an `audio.metadata` word boundary for every turn
    pub word_boundaries: bool,
    /// Drop the TCP connection without a close frame after this many turns
    pub drop_after_turns: Option<usize>,
    /// Send audio before `turn.start`
    pub early_audio: bool,
    /// Answer with a correlation id other than the request's
    pub foreign_request_id: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            audio_frames: 1,
            word_boundaries: true,
            drop_after_turns: None,
            early_audio: false,
            foreign_request_id: false,
        }
    }
}

/// What the client sent during the WebSocket handshake
#[derive(Clone, Debug)]
pub struct Handshake {
    pub uri: String,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Default)]
struct MockState {
    connections: AtomicU64,
    turns: AtomicU64,
    requests: Mutex<Vec<String>>,
    handshakes: Mutex<Vec<Handshake>>,
    close_codes: Mutex<Vec<u16>>,
}

pub struct EdgeMockServer {
    pub url: String,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl EdgeMockServer {
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());

        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = server_state.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state, behavior).await {
                        eprintln!("mock connection error: {e}");
                    }
                });
            }
        });

        Self {
            url: format!("ws://{addr}/consumer/speech/synthesize/readaloud/edge/v1"),
            state,
            handle,
        }
    }

    pub fn connections(&self) -> u64 {
        self.state.connections.load(Ordering::Relaxed)
    }

    pub fn turns(&self) -> u64 {
        self.state.turns.load(Ordering::Relaxed)
    }

    /// Every text request received, in order
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.state.handshakes.lock().unwrap().clone()
    }

    /// Close codes sent by clients
    pub fn close_codes(&self) -> Vec<u16> {
        self.state.close_codes.lock().unwrap().clone()
    }
}

impl Drop for EdgeMockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn header_value(request: &str, name: &str) -> Option<String> {
    request
        .split("\r\n\r\n")
        .next()?
        .split("\r\n")
        .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
        .map(|v| v.trim().to_string())
}

/// Text inside the prosody element of an SSML request
fn prosody_text(request: &str) -> String {
    let start = request
        .find("<prosody")
        .and_then(|i| request[i..].find('>').map(|j| i + j + 1));
    let end = request.rfind("</prosody>");
    match (start, end) {
        (Some(start), Some(end)) if start <= end => request[start..end].to_string(),
        _ => String::new(),
    }
}

fn control(id: &str, path: &str, body: serde_json::Value) -> Message {
    Message::Text(
        format!(
            "X-RequestId:{id}\r\nContent-Type:application/json; charset=utf-8\r\nPath:{path}\r\n\r\n{body}"
        )
        .into(),
    )
}

fn audio(id: &str, payload: &[u8]) -> Message {
    let header =
        format!("X-RequestId:{id}\r\nContent-Type:audio/mpeg\r\nX-StreamId:s1\r\nPath:audio\r\n");
    let mut frame = Vec::with_capacity(2 + header.len() + payload.len());
    frame.extend_from_slice(&(header.len() as u16).to_be_bytes());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    Message::Binary(Bytes::from(frame))
}

async fn play_turn(
    ws: &mut WebSocketStream<TcpStream>,
    id: &str,
    text: &str,
    behavior: &MockBehavior,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if behavior.early_audio {
        ws.send(audio(id, text.as_bytes())).await?;
    }
    ws.send(control(id, "turn.start", json!({"context": {"serviceTag": "mock"}})))
        .await?;
    ws.send(control(
        id,
        "response",
        json!({"context": {"serviceTag": "mock"}, "audio": {"type": "inline", "streamId": "s1"}}),
    ))
    .await?;

    let bytes = text.as_bytes();
    let frames = behavior.audio_frames.max(1);
    let step = bytes.len().div_ceil(frames).max(1);
    for piece in bytes.chunks(step) {
        ws.send(audio(id, piece)).await?;
    }
    if bytes.is_empty() {
        ws.send(audio(id, b"")).await?;
    }

    if behavior.word_boundaries {
        ws.send(control(
            id,
            "audio.metadata",
            json!({"Metadata": [{
                "Type": "WordBoundary",
                "Data": {
                    "Offset": 1_000_000,
                    "Duration": 2_000_000,
                    "text": {"Text": text, "Length": text.len(), "BoundaryType": "WordBoundary"}
                }
            }]}),
        ))
        .await?;
    }

    ws.send(control(id, "turn.end", json!({}))).await?;
    Ok(())
}

async fn wait_for_ssml_or_close(ws: &mut WebSocketStream<TcpStream>, state: &MockState) {
    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(text) => {
                let text = text.as_str().to_string();
                let is_ssml = header_value(&text, "Path").as_deref() == Some("ssml");
                state.requests.lock().unwrap().push(text);
                if is_ssml {
                    return;
                }
            }
            Message::Close(_) => return,
            _ => {}
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockState>,
    behavior: MockBehavior,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handshake_state = state.clone();
    let record_handshake =
        move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let header = |name: &str| {
                request
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            handshake_state.handshakes.lock().unwrap().push(Handshake {
                uri: request.uri().to_string(),
                origin: header("origin"),
                user_agent: header("user-agent"),
            });
            Ok(response)
        };
    let mut ws = accept_hdr_async(stream, record_handshake).await?;

    state.connections.fetch_add(1, Ordering::Relaxed);
    let mut turns = 0usize;

    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => {
                let text = text.as_str().to_string();
                state.requests.lock().unwrap().push(text.clone());
                if header_value(&text, "Path").as_deref() != Some("ssml") {
                    continue;
                }

                let id = header_value(&text, "X-RequestId").unwrap_or_default();
                let id = if behavior.foreign_request_id {
                    "0123456789abcdef0123456789abcdef".to_string()
                } else {
                    id
                };
                // A client that rejects the turn hangs up mid-way
                if play_turn(&mut ws, &id, &prosody_text(&text), &behavior)
                    .await
                    .is_err()
                {
                    break;
                }
                turns += 1;
                state.turns.fetch_add(1, Ordering::Relaxed);

                if behavior.drop_after_turns == Some(turns) {
                    // Wait for the client's next move so nothing is left unread
                    // when the socket goes away
                    wait_for_ssml_or_close(&mut ws, &state).await;
                    return Ok(());
                }
            }
            Message::Close(frame) => {
                let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                state.close_codes.lock().unwrap().push(code);
            }
            _ => {}
        }
    }
    Ok(())
}
