//! Transport over a remote voice-chat channel.
//!
//! Inbound audio from allow-listed senders accumulates between listen
//! windows; outbound speech is resampled to 48 kHz and paced out in 20 ms
//! frames. While a send is in progress (plus the settle time) every
//! inbound chunk is dropped so the assistant never transcribes itself.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::channel::VoiceChannel;
use super::gate::SendGate;
use super::{AudioTransport, TransportFuture};
use crate::audio::{PcmAudio, WavAudio, CAPTURE_SAMPLE_RATE};
use crate::error::{ChannelError, TransportError};
use crate::stt::SttEngine;

pub const CHANNEL_SAMPLE_RATE: u32 = 48_000;
pub const FRAME_SAMPLES: usize = 960;
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

pub struct DuplexAudioTransport {
    channel: Arc<dyn VoiceChannel>,
    stt: Arc<dyn SttEngine>,
    listen_to: HashSet<String>,
    gate: SendGate,
    inbound: Mutex<Vec<i16>>,
    send_lock: tokio::sync::Mutex<()>,
    timeout_slack: Duration,
}

impl DuplexAudioTransport {
    pub fn new(
        channel: Arc<dyn VoiceChannel>,
        stt: Arc<dyn SttEngine>,
        gate: SendGate,
        listen_to: impl IntoIterator<Item = String>,
        timeout_slack: Duration,
    ) -> Self {
        Self {
            channel,
            stt,
            listen_to: listen_to.into_iter().collect(),
            gate,
            inbound: Mutex::new(Vec::new()),
            send_lock: tokio::sync::Mutex::new(()),
            timeout_slack,
        }
    }

    /// Buffer a chunk from `sender`, unless we are speaking or not listening to them.
    pub fn on_audio_received(&self, sender: &str, pcm: &[i16]) {
        if self.gate.is_sending() {
            trace!(sender = %sender, samples = pcm.len(), "Discarding inbound audio while sending");
            return;
        }
        if !self.listen_to.contains(sender) {
            trace!(sender = %sender, "Ignoring audio from unlisted sender");
            return;
        }
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(pcm);
    }

    fn buffered_samples(&self) -> usize {
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Take everything buffered so far and transcribe it.
    async fn drain_recognized_text(&self) -> Option<String> {
        let samples = std::mem::take(&mut *self.inbound.lock().unwrap_or_else(PoisonError::into_inner));
        if samples.is_empty() {
            return None;
        }
        debug!(samples = samples.len(), "Transcribing voice chat audio");

        let wav = match PcmAudio::from_i16(&samples, CHANNEL_SAMPLE_RATE)
            .resampled(CAPTURE_SAMPLE_RATE)
            .encode_wav()
        {
            Ok(wav) => wav,
            Err(e) => {
                warn!("Failed to encode inbound audio: {}", e);
                return None;
            }
        };
        match self.stt.transcribe(&wav).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(engine = %self.stt.name(), "Transcription failed: {:#}", e);
                None
            }
        }
    }

    async fn stream_frames(&self, pcm: &[i16]) -> Result<(), TransportError> {
        let mut ticker = tokio::time::interval(FRAME_DURATION);
        let mut frame = vec![0i16; FRAME_SAMPLES];
        for chunk in pcm.chunks(FRAME_SAMPLES) {
            ticker.tick().await;
            frame[..chunk.len()].copy_from_slice(chunk);
            frame[chunk.len()..].fill(0);
            match self.channel.send_frame(&frame).await {
                Ok(()) => {}
                Err(ChannelError::Closed(reason)) => return Err(TransportError::ConnectionLost(reason)),
                Err(ChannelError::Transient(reason)) => warn!("Dropped outbound frame: {}", reason),
            }
        }
        Ok(())
    }
}

impl AudioTransport for DuplexAudioTransport {
    fn run<'a>(&'a self, cancel: &'a CancellationToken) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    received = self.channel.recv() => match received {
                        Ok(audio) => self.on_audio_received(&audio.sender, &audio.pcm),
                        Err(ChannelError::Transient(reason)) => {
                            warn!("Voice channel hiccup: {}", reason);
                        }
                        Err(ChannelError::Closed(reason)) => {
                            error!("Voice channel closed: {}", reason);
                            return Err(TransportError::ConnectionLost(reason));
                        }
                    },
                }
            }
        })
    }

    fn send<'a>(&'a self, audio: &'a WavAudio) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let pcm = audio.decode()?.resampled(CHANNEL_SAMPLE_RATE);
            let budget = pcm.duration() + self.timeout_slack;
            let samples = pcm.to_i16();

            let _serial = self.send_lock.lock().await;
            let _sending = self.gate.open();
            debug!(frames = samples.len().div_ceil(FRAME_SAMPLES), "Streaming speech to voice chat");

            match tokio::time::timeout(budget, self.stream_frames(&samples)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(?budget, "Voice chat send timed out");
                    Err(TransportError::Timeout(budget))
                }
            }
        })
    }

    fn listen(&self, window: Duration) -> TransportFuture<'_, Option<String>> {
        Box::pin(async move {
            tokio::time::sleep(window).await;
            Ok(self.drain_recognized_text().await)
        })
    }

    fn is_sending(&self) -> bool {
        self.gate.is_sending()
    }

    fn name(&self) -> String {
        format!("voice-chat ({})", self.stt.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::channel::{ChannelFuture, InboundAudio};
    use std::future::Future;
    use std::pin::Pin;
    use tokio::sync::mpsc;

    struct FakeChannel {
        sent: Mutex<Vec<Vec<i16>>>,
        inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundAudio>>,
        stall: bool,
    }

    impl FakeChannel {
        fn new(stall: bool) -> (Arc<Self>, mpsc::UnboundedSender<InboundAudio>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let channel = Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                inbound: tokio::sync::Mutex::new(rx),
                stall,
            });
            (channel, tx)
        }
    }

    impl VoiceChannel for FakeChannel {
        fn send_frame<'a>(&'a self, pcm: &'a [i16]) -> ChannelFuture<'a, ()> {
            Box::pin(async move {
                if self.stall {
                    std::future::pending::<()>().await;
                }
                self.sent.lock().unwrap().push(pcm.to_vec());
                Ok(())
            })
        }

        fn recv(&self) -> ChannelFuture<'_, InboundAudio> {
            Box::pin(async move {
                match self.inbound.lock().await.recv().await {
                    Some(audio) => Ok(audio),
                    None => Err(ChannelError::Closed("relay went away".into())),
                }
            })
        }
    }

    struct CountingStt;

    impl SttEngine for CountingStt {
        fn transcribe<'a>(
            &'a self,
            audio: &'a WavAudio,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
            Box::pin(async move {
                let pcm = audio.decode()?;
                Ok(format!("heard {} Hz audio", pcm.sample_rate))
            })
        }

        fn name(&self) -> String {
            "counting".into()
        }
    }

    fn transport(channel: Arc<FakeChannel>, settle: Duration) -> DuplexAudioTransport {
        DuplexAudioTransport::new(
            channel,
            Arc::new(CountingStt),
            SendGate::new(settle),
            ["User".to_string()],
            Duration::from_secs(2),
        )
    }

    fn speech(samples: usize) -> WavAudio {
        PcmAudio::mono(vec![0.5; samples], CHANNEL_SAMPLE_RATE)
            .encode_wav()
            .unwrap()
    }

    #[test]
    fn test_only_listened_senders_are_buffered() {
        let (channel, _tx) = FakeChannel::new(false);
        let transport = transport(channel, Duration::ZERO);

        transport.on_audio_received("Stranger", &[1, 2, 3]);
        assert_eq!(transport.buffered_samples(), 0);
        transport.on_audio_received("User", &[1, 2, 3]);
        assert_eq!(transport.buffered_samples(), 3);
    }

    #[test]
    fn test_inbound_audio_discarded_while_sending() {
        let (channel, _tx) = FakeChannel::new(false);
        let transport = transport(channel, Duration::ZERO);

        let sending = transport.gate.open();
        transport.on_audio_received("User", &[7; 960]);
        assert_eq!(transport.buffered_samples(), 0);

        drop(sending);
        transport.on_audio_received("User", &[7; 960]);
        assert_eq!(transport.buffered_samples(), 960);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_paces_padded_frames() {
        let (channel, _tx) = FakeChannel::new(false);
        let transport = transport(Arc::clone(&channel), Duration::from_millis(300));
        let start = tokio::time::Instant::now();

        // 2.5 frames of audio.
        transport.send(&speech(2400)).await.unwrap();

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|f| f.len() == FRAME_SAMPLES));
        assert_eq!(sent[2][0], 16384);
        assert!(sent[2][480..].iter().all(|&s| s == 0));
        assert_eq!(start.elapsed(), FRAME_DURATION * 2);
        assert!(transport.is_sending(), "settle window still open right after send");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_times_out() {
        let (channel, _tx) = FakeChannel::new(true);
        let transport = transport(channel, Duration::ZERO);

        let err = transport.send(&speech(4800)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(2100)));
        assert!(!err.is_fatal());
        assert!(!transport.is_sending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_transcribes_buffered_audio() {
        let (channel, tx) = FakeChannel::new(false);
        let transport = Arc::new(transport(channel, Duration::ZERO));
        let cancel = CancellationToken::new();

        let runner = {
            let transport = Arc::clone(&transport);
            let cancel = cancel.clone();
            tokio::spawn(async move { transport.run(&cancel).await })
        };

        tx.send(InboundAudio {
            sender: "User".into(),
            pcm: vec![1000; 4800],
        })
        .unwrap();

        let heard = transport.listen(Duration::from_secs(1)).await.unwrap();
        assert_eq!(heard.as_deref(), Some("heard 16000 Hz audio"));
        assert_eq!(transport.listen(Duration::from_secs(1)).await.unwrap(), None);

        cancel.cancel();
        assert!(runner.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_channel_is_fatal() {
        let (channel, tx) = FakeChannel::new(false);
        let transport = transport(channel, Duration::ZERO);
        drop(tx);

        let err = transport.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost(_)));
        assert!(err.is_fatal());
    }
}
