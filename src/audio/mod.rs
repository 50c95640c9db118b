//! Audio formats, microphone capture, ring buffer and local playback.

pub mod capture;
pub mod energy;
pub mod playback;
pub mod ring_buffer;
pub mod wav;

pub use capture::{list_devices, start_capture, InputDevice, CAPTURE_SAMPLE_RATE};
pub use ring_buffer::{audio_ring_buffer, AudioConsumer, AudioProducer};
pub use wav::{AudioHandle, PcmAudio, WavAudio};
