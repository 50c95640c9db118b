//! Microphone capture via cpal.
//!
//! Opens the default (or named) input device, captures audio at its native
//! sample rate, resamples to 16 kHz mono f32 and pushes it into a ring buffer.
//! Samples captured while `muted` reports true are discarded so the local
//! speaker output is never recorded back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tracing::{error, info, trace};

use super::ring_buffer::AudioProducer;
use super::wav::{resample_linear, to_mono};
use crate::error::TransportError;

/// Sample rate of everything pushed into the ring buffer.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// An input device as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

/// List available input devices, in host enumeration order.
pub fn list_devices() -> Result<Vec<InputDevice>, TransportError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let devices = host
        .input_devices()
        .map_err(|e| TransportError::Device(format!("Failed to enumerate input devices: {e}")))?;

    Ok(devices
        .enumerate()
        .filter_map(|(index, dev)| dev.name().ok().map(|name| (index, name)))
        .map(|(index, name)| InputDevice {
            index,
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        })
        .collect())
}

/// Resolved info about the audio input we will use.
struct CaptureConfig {
    device: cpal::Device,
    stream_config: StreamConfig,
    native_rate: u32,
}

/// Find and configure the input device.
fn resolve_device(device_name: Option<&str>) -> Result<CaptureConfig, TransportError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| TransportError::Device(format!("Failed to enumerate input devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| TransportError::Device(format!("Input device not found: {name}")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| TransportError::Device("No default input device available".into()))?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device
        .default_input_config()
        .map_err(|e| TransportError::Device(format!("Failed to get default input config: {e}")))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate,
        channels,
        "Input device config (will resample to {}Hz mono if needed)",
        CAPTURE_SAMPLE_RATE,
    );

    Ok(CaptureConfig {
        device,
        stream_config,
        native_rate,
    })
}

/// Start audio capture. Returns the cpal `Stream` (must be kept alive).
///
/// `failed` is raised if the device reports a stream error after start.
pub fn start_capture<M>(
    mut producer: AudioProducer,
    device_name: Option<&str>,
    muted: M,
    failed: Arc<AtomicBool>,
) -> Result<Stream, TransportError>
where
    M: Fn() -> bool + Send + 'static,
{
    let cfg = resolve_device(device_name)?;
    let native_rate = cfg.native_rate;
    let channels = cfg.stream_config.channels;

    let stream = cfg
        .device
        .build_input_stream(
            &cfg.stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                if muted() {
                    trace!(samples = data.len(), "Dropping microphone input while speaking");
                    return;
                }
                let mono = to_mono(data, channels);
                let resampled = resample_linear(&mono, native_rate, CAPTURE_SAMPLE_RATE);
                // A full buffer loses the newest audio; the listener catches up.
                producer.push_slice(&resampled);
            },
            move |err| {
                error!("Audio input stream error: {}", err);
                failed.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| TransportError::Device(format!("Failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| TransportError::Device(format!("Failed to start input stream: {e}")))?;

    info!("Audio capture started");

    Ok(stream)
}
