//! HTTP TTS adapters: a generic WAV speech server and OpenAI TTS.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::info;

use super::{TtsEngine, VoiceStyle};
use crate::audio::{PcmAudio, WavAudio};

// ---------------------------------------------------------------------------
// Generic speech server
// ---------------------------------------------------------------------------

/// Request body for the speech server.
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    emotion: &'a str,
    speed: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    speaker: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

/// Speech server answering POSTed JSON with a WAV body.
pub struct HttpTts {
    endpoint: String,
    api_key: Option<String>,
    style: VoiceStyle,
    client: reqwest::Client,
}

impl HttpTts {
    pub fn new(endpoint: &str, api_key: Option<&str>, style: VoiceStyle) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.map(str::to_string),
            style,
            client: reqwest::Client::new(),
        }
    }

    fn request<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            text,
            emotion: &self.style.emotion,
            speed: self.style.speed,
            speaker: self.style.speaker.as_deref(),
            language: self.style.language.as_deref(),
        }
    }
}

impl TtsEngine for HttpTts {
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WavAudio>> + Send + 'a>> {
        Box::pin(async move {
            info!(endpoint = %self.endpoint, text_len = text.len(), "TTS request");

            let mut req = self.client.post(&self.endpoint).json(&self.request(text));
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("TTS request failed: {}", e))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("TTS server error {}: {}", status, body);
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read TTS response: {}", e))?;

            let audio = WavAudio::from_bytes(bytes.to_vec());
            // Reject non-WAV bodies here rather than at playback time.
            audio
                .decode()
                .map_err(|e| anyhow::anyhow!("TTS server returned invalid WAV: {}", e))?;

            info!(bytes = audio.len(), "TTS synthesis complete");
            Ok(audio)
        })
    }

    fn name(&self) -> String {
        format!("HTTP TTS ({})", self.endpoint)
    }
}

// ---------------------------------------------------------------------------
// OpenAI TTS
// ---------------------------------------------------------------------------

/// Raw PCM from the OpenAI speech endpoint is 24 kHz 16-bit mono.
const OPENAI_PCM_SAMPLE_RATE: u32 = 24_000;

/// OpenAI TTS, paid cloud synthesis via REST API.
///
/// POST `https://api.openai.com/v1/audio/speech`
/// Body: `{"model": "tts-1", "input": "text", "voice": "alloy", "response_format": "pcm"}`
pub struct OpenAiTts {
    api_key: String,
    voice: String,
    model: String,
    speed: f32,
    client: reqwest::Client,
}

impl OpenAiTts {
    pub fn new(api_key: &str, voice: &str, speed: f32) -> Self {
        Self {
            api_key: api_key.to_string(),
            voice: voice.to_string(),
            model: "tts-1".to_string(),
            // The API accepts 0.25..=4.0.
            speed: speed.clamp(0.25, 4.0),
            client: reqwest::Client::new(),
        }
    }
}

/// Convert little-endian i16 PCM bytes to a mono WAV clip.
fn pcm_bytes_to_wav(bytes: &[u8], sample_rate: u32) -> anyhow::Result<WavAudio> {
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    Ok(PcmAudio::from_i16(&samples, sample_rate).encode_wav()?)
}

impl TtsEngine for OpenAiTts {
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WavAudio>> + Send + 'a>> {
        Box::pin(async move {
            info!(voice = %self.voice, text_len = text.len(), "OpenAI TTS request");

            let body = serde_json::json!({
                "model": self.model,
                "input": text,
                "voice": self.voice,
                "speed": self.speed,
                "response_format": "pcm",
            });

            let resp = self
                .client
                .post("https://api.openai.com/v1/audio/speech")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("OpenAI TTS request failed: {}", e))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("OpenAI TTS API error {}: {}", status, body);
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read OpenAI TTS response: {}", e))?;

            let audio = pcm_bytes_to_wav(&bytes, OPENAI_PCM_SAMPLE_RATE)?;
            info!(bytes = audio.len(), "OpenAI TTS synthesis complete");
            Ok(audio)
        })
    }

    fn name(&self) -> String {
        format!("OpenAI TTS ({})", self.voice)
    }
}
