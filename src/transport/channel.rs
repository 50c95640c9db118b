//! Remote voice-chat channel over a WebSocket relay.
//!
//! Frames are JSON text messages:
//!   `{"type":"join","name":"Jenny"}`
//!   `{"type":"audio","from":"User","pcm":"<base64 s16le, 48 kHz mono>"}`
//! Unknown frame types are ignored.

use std::future::Future;
use std::pin::Pin;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::ChannelError;

pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChannelError>> + Send + 'a>>;

/// One chunk of audio from a named remote sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundAudio {
    pub sender: String,
    pub pcm: Vec<i16>,
}

/// A duplex voice channel carrying 48 kHz mono s16 frames.
pub trait VoiceChannel: Send + Sync {
    fn send_frame<'a>(&'a self, pcm: &'a [i16]) -> ChannelFuture<'a, ()>;

    /// Next inbound audio chunk. `Closed` means the channel is gone for good.
    fn recv(&self) -> ChannelFuture<'_, InboundAudio>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RelayFrame {
    Join { name: String },
    Audio { from: String, pcm: String },
    #[serde(other)]
    Other,
}

pub fn encode_frame(from: &str, pcm: &[i16]) -> String {
    let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
    let frame = RelayFrame::Audio {
        from: from.to_string(),
        pcm: B64.encode(bytes),
    };
    // A struct of strings always serializes.
    serde_json::to_string(&frame).unwrap_or_default()
}

/// Parse a relay text frame; `Ok(None)` for frames that carry no audio.
pub fn decode_frame(text: &str) -> Result<Option<InboundAudio>, ChannelError> {
    let frame: RelayFrame = serde_json::from_str(text)
        .map_err(|e| ChannelError::Transient(format!("malformed relay frame: {e}")))?;
    match frame {
        RelayFrame::Audio { from, pcm } => {
            let bytes = B64
                .decode(pcm)
                .map_err(|e| ChannelError::Transient(format!("bad audio payload from {from}: {e}")))?;
            if bytes.len() % 2 != 0 {
                return Err(ChannelError::Transient(format!(
                    "odd-length audio payload from {from}"
                )));
            }
            let pcm = bytes
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect();
            Ok(Some(InboundAudio { sender: from, pcm }))
        }
        RelayFrame::Join { name } => {
            debug!(name = %name, "Participant joined relay");
            Ok(None)
        }
        RelayFrame::Other => Ok(None),
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn classify_ws_error(err: tungstenite::Error) -> ChannelError {
    match err {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Io(_) => ChannelError::Closed(err.to_string()),
        other => ChannelError::Transient(other.to_string()),
    }
}

pub struct WebSocketChannel {
    username: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketChannel {
    /// Connect to the relay at `url` and announce ourselves as `username`.
    pub async fn connect(url: &str, username: &str) -> Result<Self, ChannelError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ChannelError::Closed(format!("invalid relay URL {url}: {e}")))?;
        let name = HeaderValue::from_str(username)
            .map_err(|e| ChannelError::Closed(format!("invalid username {username:?}: {e}")))?;
        request.headers_mut().insert("X-Voice-User", name);

        let (ws, _resp) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ChannelError::Closed(format!("failed to connect to {url}: {e}")))?;
        let (mut sink, stream) = ws.split();

        let join = serde_json::to_string(&RelayFrame::Join {
            name: username.to_string(),
        })
        .unwrap_or_default();
        sink.send(Message::Text(join)).await.map_err(classify_ws_error)?;

        info!(url = %url, username = %username, "Connected to voice relay");
        Ok(Self {
            username: username.to_string(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

impl VoiceChannel for WebSocketChannel {
    fn send_frame<'a>(&'a self, pcm: &'a [i16]) -> ChannelFuture<'a, ()> {
        Box::pin(async move {
            let text = encode_frame(&self.username, pcm);
            self.sink
                .lock()
                .await
                .send(Message::Text(text))
                .await
                .map_err(classify_ws_error)
        })
    }

    fn recv(&self) -> ChannelFuture<'_, InboundAudio> {
        Box::pin(async move {
            let mut stream = self.stream.lock().await;
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(audio) = decode_frame(&text)? {
                            return Ok(audio);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Err(ChannelError::Closed(format!("relay closed: {frame:?}")));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(classify_ws_error(e)),
                    None => return Err(ChannelError::Closed("relay stream ended".into())),
                }
            }
        })
    }
}
