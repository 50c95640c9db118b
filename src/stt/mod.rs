//! Speech-to-Text collaborators and transcript classification.
//!
//! Provides a common `SttEngine` trait with implementations for:
//! - OpenAI Whisper API (cloud)
//! - Custom user-configured transcription endpoint
//!
//! Transcripts are classified into [`Recognition`] before anything acts on
//! them: an empty transcript or a known hallucination is "no input", not an
//! error.

pub mod cloud;

use std::future::Future;
use std::pin::Pin;

use tracing::info;

use crate::audio::WavAudio;
use crate::config::Settings;

/// Common trait for all STT engines (dyn-compatible).
pub trait SttEngine: Send + Sync {
    /// Transcribe a WAV clip to text. An empty string means nothing was heard.
    fn transcribe<'a>(
        &'a self,
        audio: &'a WavAudio,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;

    /// Display name for this engine.
    fn name(&self) -> String;
}

/// Outcome of one listen cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Recognized(String),
    NoInput,
    /// The recognizer produced one of the configured phantom phrases.
    Hallucination(String),
}

/// Classify a raw transcript. Hallucinations are matched exactly after trimming.
pub fn classify(transcript: Option<&str>, hallucinations: &[String]) -> Recognition {
    let Some(text) = transcript.map(str::trim) else {
        return Recognition::NoInput;
    };
    if text.is_empty() {
        return Recognition::NoInput;
    }
    if hallucinations.iter().any(|h| h.trim() == text) {
        info!(text = %text, "Filtered speech recognition hallucination");
        return Recognition::Hallucination(text.to_string());
    }
    Recognition::Recognized(text.to_string())
}

/// Create an STT engine from settings.
///
/// `STT_ADAPTER` is one of: "openai", "custom".
pub fn create_stt_engine(settings: &Settings) -> anyhow::Result<Box<dyn SttEngine>> {
    let language = Some(settings.language.as_str());
    let model = settings.stt_model.as_deref();
    match settings.stt_adapter.as_str() {
        "openai" => {
            let key = settings
                .stt_api_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("OpenAI STT requires STT_API_KEY"))?;
            Ok(Box::new(cloud::HttpStt::openai(key, model, language)))
        }
        "custom" => {
            let url = settings
                .stt_endpoint
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Custom STT requires STT_ENDPOINT"))?;
            Ok(Box::new(cloud::HttpStt::custom(
                url,
                settings.stt_api_key.as_deref(),
                model,
                language,
            )))
        }
        other => anyhow::bail!("Unknown STT adapter: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hallucinations() -> Vec<String> {
        vec!["Thanks for watching!".into(), "you".into(), "\u{200b}".into()]
    }

    #[test]
    fn test_empty_transcripts_are_no_input() {
        assert_eq!(classify(None, &hallucinations()), Recognition::NoInput);
        assert_eq!(classify(Some(""), &hallucinations()), Recognition::NoInput);
        assert_eq!(classify(Some("  \n"), &hallucinations()), Recognition::NoInput);
    }

    #[test]
    fn test_exact_hallucination_is_filtered() {
        assert_eq!(
            classify(Some("  Thanks for watching! "), &hallucinations()),
            Recognition::Hallucination("Thanks for watching!".into())
        );
        assert_eq!(
            classify(Some("\u{200b}"), &hallucinations()),
            Recognition::Hallucination("\u{200b}".into())
        );
    }

    #[test]
    fn test_hallucination_inside_real_speech_is_kept() {
        assert_eq!(
            classify(Some("Thank you"), &hallucinations()),
            Recognition::Recognized("Thank you".into())
        );
        assert_eq!(
            classify(Some(" What is two plus two? "), &hallucinations()),
            Recognition::Recognized("What is two plus two?".into())
        );
    }
}
