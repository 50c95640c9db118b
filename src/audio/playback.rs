//! Local speaker playback via rodio.
//!
//! Runs on a blocking thread: opens the default output device, plays one
//! clip and polls for cancellation until the sink drains.

use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::wav::PcmAudio;
use crate::error::TransportError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Play `pcm` through the default output device, blocking until it finishes
/// or `cancel` fires.
pub fn play_blocking(pcm: PcmAudio, cancel: &CancellationToken) -> Result<(), TransportError> {
    if pcm.samples.is_empty() {
        return Ok(());
    }

    let (_stream, stream_handle) = OutputStream::try_default()
        .map_err(|e| TransportError::Device(format!("No audio output device available: {e}")))?;
    let sink = Sink::try_new(&stream_handle)
        .map_err(|e| TransportError::Device(format!("Failed to create audio sink: {e}")))?;

    let channels = pcm.channels.max(1);
    sink.append(SamplesBuffer::new(channels, pcm.sample_rate, pcm.samples));

    while !sink.empty() {
        if cancel.is_cancelled() {
            info!("Playback cancelled");
            sink.stop();
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    sink.sleep_until_end();

    Ok(())
}
