//! Generation parameters sent with every backend call.

use crate::config::Settings;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Also the prompt's character budget.
    pub max_context_length: usize,
    pub repetition_penalty: f32,
    pub stop_sequence: Vec<String>,
    pub sampler_seed: Option<u64>,
}

impl GenerationParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            temperature: settings.generate_temperature,
            max_tokens: settings.max_tokens,
            max_context_length: settings.max_context_length,
            repetition_penalty: settings.repetition_penalty,
            stop_sequence: settings.ai_model_stop_words.clone(),
            sampler_seed: settings.sampler_seed,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 512,
            max_context_length: 2048,
            repetition_penalty: 1.5,
            stop_sequence: Vec::new(),
            sampler_seed: None,
        }
    }
}
