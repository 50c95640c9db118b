//! HTTP transcription adapters (OpenAI Whisper API, custom endpoint).
//!
//! Both speak the OpenAI multipart contract: a `file` part holding WAV audio
//! plus `model` and optional `language` fields; the reply is `{"text": ...}`.

use std::future::Future;
use std::pin::Pin;

use reqwest::multipart;
use tracing::debug;

use super::SttEngine;
use crate::audio::WavAudio;

const OPENAI_TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEFAULT_MODEL: &str = "whisper-1";

/// Multipart transcription client.
pub struct HttpStt {
    label: &'static str,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    language: Option<String>,
    client: reqwest::Client,
}

impl HttpStt {
    pub fn openai(api_key: &str, model: Option<&str>, language: Option<&str>) -> Self {
        Self::build("OpenAI Whisper", OPENAI_TRANSCRIPTIONS_URL, Some(api_key), model, language)
    }

    pub fn custom(
        endpoint: &str,
        api_key: Option<&str>,
        model: Option<&str>,
        language: Option<&str>,
    ) -> Self {
        Self::build("Custom STT", endpoint, api_key, model, language)
    }

    fn build(
        label: &'static str,
        endpoint: &str,
        api_key: Option<&str>,
        model: Option<&str>,
        language: Option<&str>,
    ) -> Self {
        Self {
            label,
            endpoint: endpoint.to_string(),
            api_key: api_key.map(str::to_string),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            language: language.map(language_code),
            client: reqwest::Client::new(),
        }
    }
}

/// Whisper expects ISO-639-1 codes; settings usually hold a language name.
fn language_code(language: &str) -> String {
    match language.trim().to_lowercase().as_str() {
        "english" => "en".into(),
        "german" => "de".into(),
        "french" => "fr".into(),
        "spanish" => "es".into(),
        "italian" => "it".into(),
        "portuguese" => "pt".into(),
        "dutch" => "nl".into(),
        "japanese" => "ja".into(),
        "chinese" => "zh".into(),
        other => other.to_string(),
    }
}

/// Pull the transcript out of a `{"text": ...}` reply.
fn parse_transcript(json: &serde_json::Value) -> String {
    json["text"].as_str().unwrap_or("").to_string()
}

impl SttEngine for HttpStt {
    fn transcribe<'a>(
        &'a self,
        audio: &'a WavAudio,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            debug!(
                bytes = audio.len(),
                endpoint = %self.endpoint,
                "Sending audio to {}",
                self.label
            );

            let file_part = multipart::Part::bytes(audio.as_bytes().to_vec())
                .file_name("audio.wav")
                .mime_str("audio/wav")?;

            let mut form = multipart::Form::new()
                .text("model", self.model.clone())
                .part("file", file_part);
            if let Some(language) = &self.language {
                form = form.text("language", language.clone());
            }

            let mut req = self.client.post(&self.endpoint).multipart(form);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req.send().await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("{} API error {}: {}", self.label, status, body);
            }

            let json: serde_json::Value = resp.json().await?;
            Ok(parse_transcript(&json))
        })
    }

    fn name(&self) -> String {
        format!("{} ({})", self.label, self.model)
    }
}
