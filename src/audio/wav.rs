//! WAV encoding/decoding and the sample conversions shared by every transport.

use std::fmt;
use std::io::Cursor;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// A WAV-encoded audio clip, as produced by speech synthesis.
#[derive(Clone, PartialEq, Eq)]
pub struct WavAudio {
    bytes: Vec<u8>,
}

impl WavAudio {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode to f32 samples in `[-1.0, 1.0]`, any bit depth.
    pub fn decode(&self) -> Result<PcmAudio, hound::Error> {
        let reader = WavReader::new(Cursor::new(self.bytes.as_slice()))?;
        let spec = reader.spec();
        let samples = match spec.sample_format {
            SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(PcmAudio {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }
}

impl fmt::Debug for WavAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WavAudio").field("bytes", &self.bytes.len()).finish()
    }
}

/// Interleaved f32 samples with their format.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmAudio {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Mono audio from signed 16-bit samples.
    pub fn from_i16(samples: &[i16], sample_rate: u32) -> Self {
        Self::mono(
            samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect(),
            sample_rate,
        )
    }

    pub fn into_mono(self) -> Self {
        if self.channels <= 1 {
            return self;
        }
        Self::mono(to_mono(&self.samples, self.channels), self.sample_rate)
    }

    /// Mono audio at `to_rate`.
    pub fn resampled(self, to_rate: u32) -> Self {
        let mono = self.into_mono();
        if mono.sample_rate == to_rate {
            return mono;
        }
        Self::mono(resample_linear(&mono.samples, mono.sample_rate, to_rate), to_rate)
    }

    pub fn to_i16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
            .collect()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() / self.channels as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Encode as 16-bit PCM WAV.
    pub fn encode_wav(&self) -> Result<WavAudio, hound::Error> {
        let spec = WavSpec {
            channels: self.channels.max(1),
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for sample in self.to_i16() {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        Ok(WavAudio::from_bytes(cursor.into_inner()))
    }
}

/// Simple linear resampler from `from_rate` to `to_rate`.
/// Operates on mono f32 samples.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Shared, releasable reference to a synthesized clip.
///
/// Stored in spoken-audio events. The clip is dropped once the transport that
/// played it calls [`AudioHandle::release`]; clones share the same slot.
#[derive(Clone, Default)]
pub struct AudioHandle {
    slot: Arc<Mutex<Option<Arc<WavAudio>>>>,
}

impl AudioHandle {
    pub fn new(audio: Arc<WavAudio>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(audio))),
        }
    }

    /// The clip, unless it has been released.
    pub fn get(&self) -> Option<Arc<WavAudio>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn release(&self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_released(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

impl fmt::Debug for AudioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(audio) => f.debug_tuple("AudioHandle").field(&audio).finish(),
            None => f.write_str("AudioHandle(released)"),
        }
    }
}
