//! Audio transports: where user speech comes from and assistant speech goes.
//!
//! Every transport obeys the echo rule: audio arriving while it is sending
//! (and for a short settle time after) is discarded, never transcribed.

pub mod channel;
pub mod duplex;
pub mod gate;
pub mod local;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::audio::WavAudio;
use crate::config::{Settings, UserAudio};
use crate::error::TransportError;
use crate::stt::SttEngine;

pub use channel::{InboundAudio, VoiceChannel, WebSocketChannel};
pub use duplex::DuplexAudioTransport;
pub use gate::{SendGate, SendGuard};
pub use local::LocalAudioTransport;

pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// A full-duplex audio endpoint with speech recognition on the inbound side.
pub trait AudioTransport: Send + Sync {
    /// Drive background I/O until `cancel` fires or the transport fails.
    fn run<'a>(&'a self, cancel: &'a CancellationToken) -> TransportFuture<'a, ()>;

    /// Play or stream `audio`, returning once it has been sent.
    fn send<'a>(&'a self, audio: &'a WavAudio) -> TransportFuture<'a, ()>;

    /// Collect audio for `window`, then return its transcript, if any.
    fn listen(&self, window: Duration) -> TransportFuture<'_, Option<String>>;

    fn is_sending(&self) -> bool;

    fn name(&self) -> String;
}

/// Build the transport selected by `USER_AUDIO`.
pub async fn create_transport(
    settings: &Settings,
    stt: Arc<dyn SttEngine>,
) -> anyhow::Result<Arc<dyn AudioTransport>> {
    let gate = SendGate::new(settings.send_settle());
    match settings.user_audio {
        UserAudio::Microphone => {
            let transport = LocalAudioTransport::new(
                stt,
                gate,
                settings.microphone_device.clone(),
                settings.stt_energy_threshold,
            );
            info!(transport = %transport.name(), "Using local audio");
            Ok(Arc::new(transport))
        }
        UserAudio::VoiceChat => {
            let channel =
                WebSocketChannel::connect(&settings.voice_chat_url, &settings.voice_chat_username).await?;
            let transport = DuplexAudioTransport::new(
                Arc::new(channel),
                stt,
                gate,
                settings.voice_chat_listen_to.iter().cloned(),
                settings.send_timeout_slack(),
            );
            info!(transport = %transport.name(), "Using voice chat audio");
            Ok(Arc::new(transport))
        }
    }
}
