//! Settings loading, placeholder resolution and the typed `Settings` value.
//!
//! Layers, later overriding earlier by top-level key:
//! embedded defaults, the platform search paths, then an explicit `--config`.

pub mod paths;
pub mod resolve;

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::SettingsError;
use resolve::SettingsMap;

const DEFAULT_SETTINGS: &str = include_str!("default_settings.json");

/// Keys taken literally; everything else may be templated on them.
pub const BASE_SETTING_NAMES: [&str; 4] = ["USER_NAME", "ASSISTANT_NAME", "LANGUAGE", "GENERATE_URL"];

/// Where the user's speech comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserAudio {
    /// Local microphone capture and speaker playback.
    Microphone,
    /// A remote voice-chat relay.
    VoiceChat,
}

/// Fully resolved, read-only process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    pub user_name: String,
    pub assistant_name: String,
    pub language: String,
    pub generate_url: String,

    pub generate_temperature: f32,
    pub max_tokens: u32,
    pub max_context_length: usize,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    #[serde(default)]
    pub sampler_seed: Option<u64>,
    pub ai_retry_delay_ms: u64,

    pub assistant_desc: String,
    pub assistant_greeting: String,
    pub ai_model_stop_words: Vec<String>,
    pub ai_text_to_speech_remappings: IndexMap<String, String>,
    pub non_committal_response: String,
    pub thinking: String,
    pub slow_ai_responses: bool,

    pub silent_period_prompt: String,
    pub going_to_sleep: String,
    pub waking_up: String,
    pub sleep_command: String,
    pub wake_command: String,
    pub listen_seconds: f64,
    pub silence_reprompt_periods_max: u32,

    pub stt_hallucinations: Vec<String>,
    pub stt_adapter: String,
    #[serde(default)]
    pub stt_endpoint: Option<String>,
    #[serde(default)]
    pub stt_api_key: Option<String>,
    #[serde(default)]
    pub stt_model: Option<String>,
    pub stt_energy_threshold: f32,

    pub tts_adapter: String,
    #[serde(default)]
    pub tts_endpoint: Option<String>,
    #[serde(default)]
    pub tts_api_key: Option<String>,
    #[serde(default)]
    pub tts_voice: Option<String>,
    #[serde(default)]
    pub tts_language: Option<String>,
    pub tts_mood: String,
    pub tts_speech_speed: f32,
    pub tts_retry_delay_ms: u64,

    pub user_audio: UserAudio,
    #[serde(default)]
    pub microphone_device: Option<String>,
    pub voice_chat_url: String,
    pub voice_chat_username: String,
    pub voice_chat_listen_to: Vec<String>,

    pub send_settle_ms: u64,
    pub send_timeout_slack_ms: u64,
}

fn default_repetition_penalty() -> f32 {
    1.5
}

impl Settings {
    /// Resolve placeholders in a merged template and type-check the result.
    pub fn from_template(template: &SettingsMap) -> Result<Self, SettingsError> {
        let resolved = resolve::resolve(template, &BASE_SETTING_NAMES)?;
        let settings: Settings = serde_json::from_value(Value::Object(resolved))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.user_name.trim().is_empty() || self.assistant_name.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "USER_NAME and ASSISTANT_NAME must not be empty".into(),
            ));
        }
        if self.user_name == self.assistant_name {
            return Err(SettingsError::Invalid(format!(
                "USER_NAME and ASSISTANT_NAME must differ, both are {:?}",
                self.user_name
            )));
        }
        if !(self.listen_seconds > 0.0 && self.listen_seconds.is_finite()) {
            return Err(SettingsError::Invalid(format!(
                "LISTEN_SECONDS must be positive, got {}",
                self.listen_seconds
            )));
        }
        if self.max_context_length == 0 {
            return Err(SettingsError::Invalid("MAX_CONTEXT_LENGTH must be positive".into()));
        }
        if self.sleep_command.trim().is_empty() || self.wake_command.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "SLEEP_COMMAND and WAKE_COMMAND must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_window(&self) -> Duration {
        Duration::from_secs_f64(self.listen_seconds)
    }

    pub fn ai_retry_delay(&self) -> Duration {
        Duration::from_millis(self.ai_retry_delay_ms)
    }

    pub fn tts_retry_delay(&self) -> Duration {
        Duration::from_millis(self.tts_retry_delay_ms)
    }

    pub fn send_settle(&self) -> Duration {
        Duration::from_millis(self.send_settle_ms)
    }

    pub fn send_timeout_slack(&self) -> Duration {
        Duration::from_millis(self.send_timeout_slack_ms)
    }
}

/// Load every settings layer and resolve them into `Settings`.
///
/// `explicit` must exist; the search-path files are optional.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, SettingsError> {
    let mut layers = paths::settings_search_paths();
    if let Some(path) = explicit {
        layers.push(path.to_path_buf());
    }
    let template = load_template(&layers, explicit)?;
    let settings = Settings::from_template(&template)?;
    info!(
        user = %settings.user_name,
        assistant = %settings.assistant_name,
        user_audio = ?settings.user_audio,
        "Settings resolved"
    );
    Ok(settings)
}

/// Merge the embedded defaults with `layers`, in order.
fn load_template(layers: &[PathBuf], required: Option<&Path>) -> Result<SettingsMap, SettingsError> {
    let mut template = parse_object(DEFAULT_SETTINGS, Path::new("<defaults>"))?;

    for path in layers {
        let must_exist = required.is_some_and(|r| r == path.as_path());
        if let Some(layer) = read_layer(path, must_exist)? {
            debug!(path = %path.display(), keys = layer.len(), "Merging settings layer");
            template.extend(layer);
        }
    }
    Ok(template)
}

fn read_layer(path: &Path, must_exist: bool) -> Result<Option<SettingsMap>, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_object(&contents, path).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !must_exist => Ok(None),
        Err(source) => Err(SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_object(contents: &str, path: &Path) -> Result<SettingsMap, SettingsError> {
    match serde_json::from_str::<Value>(contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SettingsError::NotAnObject(path.to_path_buf())),
        Err(source) => Err(SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}
