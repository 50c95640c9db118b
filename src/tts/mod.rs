//! Text-to-Speech collaborators and the cached, retrying synthesizer.
//!
//! Provides a common `TtsEngine` trait with implementations for:
//! - A speech server taking `{text, emotion, speed, speaker, language}` JSON
//!   and answering with WAV bytes
//! - OpenAI TTS API

pub mod cache;
pub mod cloud;

use std::future::Future;
use std::pin::Pin;

use crate::audio::WavAudio;
use crate::config::Settings;

pub use cache::SpeechSynthesizer;

/// Voice parameters sent with every synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceStyle {
    pub emotion: String,
    pub speed: f32,
    pub speaker: Option<String>,
    pub language: Option<String>,
}

impl VoiceStyle {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            emotion: settings.tts_mood.clone(),
            speed: settings.tts_speech_speed,
            speaker: settings.tts_voice.clone(),
            language: settings.tts_language.clone(),
        }
    }
}

/// Common trait for all TTS engines (dyn-compatible).
pub trait TtsEngine: Send + Sync {
    /// Synthesize text to a WAV clip.
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WavAudio>> + Send + 'a>>;

    /// Display name for this engine (e.g. "OpenAI TTS (alloy)").
    fn name(&self) -> String;
}

/// Create a TTS engine from settings.
///
/// `TTS_ADAPTER` is one of: "http", "openai".
pub fn create_tts_engine(settings: &Settings) -> anyhow::Result<Box<dyn TtsEngine>> {
    let style = VoiceStyle::from_settings(settings);
    match settings.tts_adapter.as_str() {
        "http" => {
            let url = settings
                .tts_endpoint
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("HTTP TTS requires TTS_ENDPOINT"))?;
            Ok(Box::new(cloud::HttpTts::new(url, settings.tts_api_key.as_deref(), style)))
        }
        "openai" => {
            let key = settings
                .tts_api_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("OpenAI TTS requires TTS_API_KEY"))?;
            let voice = style.speaker.as_deref().unwrap_or("alloy");
            Ok(Box::new(cloud::OpenAiTts::new(key, voice, style.speed)))
        }
        other => anyhow::bail!("Unknown TTS adapter: {}", other),
    }
}
