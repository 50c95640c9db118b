//! Transport over the local microphone and speakers.
//!
//! Capture runs on the cpal callback thread into a ring buffer; each listen
//! window starts from an empty buffer, and windows below the energy
//! threshold never reach the recognizer. The capture callback drops input
//! while the send gate is open, so speaker output is not re-heard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::gate::SendGate;
use super::{AudioTransport, TransportFuture};
use crate::audio::energy::has_speech;
use crate::audio::playback::play_blocking;
use crate::audio::{
    audio_ring_buffer, start_capture, AudioConsumer, AudioProducer, PcmAudio, WavAudio, CAPTURE_SAMPLE_RATE,
};
use crate::error::TransportError;
use crate::stt::SttEngine;

/// 20 ms at 16 kHz.
const ENERGY_WINDOW: usize = 320;
const DEVICE_POLL: Duration = Duration::from_millis(250);

/// Wrapper to make `cpal::Stream` Send.
///
/// `cpal::Stream` is `!Send` on some platforms due to internal raw pointers,
/// but it is only held to keep capture alive and dropped by the same task.
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: the stream is never accessed after creation, only dropped.
unsafe impl Send for SendStream {}

pub struct LocalAudioTransport {
    stt: Arc<dyn SttEngine>,
    gate: SendGate,
    device: Option<String>,
    energy_threshold: f32,
    producer: Mutex<Option<AudioProducer>>,
    consumer: Mutex<AudioConsumer>,
    send_lock: tokio::sync::Mutex<()>,
}

impl LocalAudioTransport {
    pub fn new(stt: Arc<dyn SttEngine>, gate: SendGate, device: Option<String>, energy_threshold: f32) -> Self {
        let (producer, consumer) = audio_ring_buffer(None);
        Self {
            stt,
            gate,
            device,
            energy_threshold,
            producer: Mutex::new(Some(producer)),
            consumer: Mutex::new(consumer),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn consumer(&self) -> std::sync::MutexGuard<'_, AudioConsumer> {
        self.consumer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioTransport for LocalAudioTransport {
    fn run<'a>(&'a self, cancel: &'a CancellationToken) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let producer = self
                .producer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or_else(|| TransportError::Device("microphone capture already running".into()))?;

            let gate = self.gate.clone();
            let failed = Arc::new(AtomicBool::new(false));
            let stream = start_capture(
                producer,
                self.device.as_deref(),
                move || gate.is_sending(),
                Arc::clone(&failed),
            )?;
            let _stream = SendStream(stream);

            let mut poll = tokio::time::interval(DEVICE_POLL);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Stopping microphone capture");
                        return Ok(());
                    }
                    _ = poll.tick() => {
                        if failed.load(Ordering::SeqCst) {
                            error!("Microphone stream failed");
                            return Err(TransportError::Device("microphone input stream failed".into()));
                        }
                    }
                }
            }
        })
    }

    fn send<'a>(&'a self, audio: &'a WavAudio) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let pcm = audio.decode()?;
            let _serial = self.send_lock.lock().await;
            let _sending = self.gate.open();

            // Dropping this future (e.g. shutdown) stops the speaker.
            let stop = CancellationToken::new();
            let _stop_on_drop = stop.clone().drop_guard();

            debug!(duration = ?pcm.duration(), "Playing speech");
            tokio::task::spawn_blocking(move || play_blocking(pcm, &stop))
                .await
                .map_err(|e| TransportError::Device(format!("playback task failed: {e}")))?
        })
    }

    fn listen(&self, window: Duration) -> TransportFuture<'_, Option<String>> {
        Box::pin(async move {
            let stale = self.consumer().clear();
            trace!(stale, "Listen window opened");
            tokio::time::sleep(window).await;

            let samples = self.consumer().drain_all();
            if !has_speech(&samples, ENERGY_WINDOW, self.energy_threshold) {
                trace!(samples = samples.len(), "No speech energy in window");
                return Ok(None);
            }

            let wav = PcmAudio::mono(samples, CAPTURE_SAMPLE_RATE).encode_wav()?;
            match self.stt.transcribe(&wav).await {
                Ok(text) => Ok(Some(text)),
                Err(e) => {
                    warn!(engine = %self.stt.name(), "Transcription failed: {:#}", e);
                    Ok(None)
                }
            }
        })
    }

    fn is_sending(&self) -> bool {
        self.gate.is_sending()
    }

    fn name(&self) -> String {
        format!("microphone ({})", self.stt.name())
    }
}
