//! Language-model backend client (KoboldAI-compatible generate API).
//!
//! POST `{prompt, temperature, max_length, max_context_length, rep_pen,
//! stop_sequence, frmttriminc, sampler_seed?}`; the reply is
//! `{"results": [{"text": "..."}]}`.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::debug;

use super::params::GenerationParams;
use crate::error::AiError;

/// Most tokens the backend will generate per call.
pub const MAX_LENGTH_LIMIT: u32 = 512;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_length: u32,
    pub max_context_length: usize,
    pub rep_pen: f32,
    pub stop_sequence: Vec<String>,
    pub frmttriminc: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler_seed: Option<u64>,
}

impl GenerateRequest {
    pub fn new(prompt: String, params: &GenerationParams) -> Self {
        Self {
            prompt,
            temperature: params.temperature,
            max_length: params.max_tokens.min(MAX_LENGTH_LIMIT),
            max_context_length: params.max_context_length,
            rep_pen: params.repetition_penalty,
            stop_sequence: params.stop_sequence.clone(),
            frmttriminc: true,
            sampler_seed: params.sampler_seed,
        }
    }
}

/// A backend that completes prompts (dyn-compatible).
pub trait AiClient: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>>;
}

/// Extract `results[0].text` from a response body.
pub fn parse_generate_response(body: &str) -> Result<String, AiError> {
    let json: serde_json::Value = serde_json::from_str(body)?;
    json["results"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or(AiError::MissingText)
}

pub struct KoboldClient {
    url: String,
    client: reqwest::Client,
}

impl KoboldClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl AiClient for KoboldClient {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
        Box::pin(async move {
            debug!(
                url = %self.url,
                prompt_chars = request.prompt.chars().count(),
                max_length = request.max_length,
                "Requesting AI completion"
            );

            let resp = self.client.post(&self.url).json(request).send().await?;

            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(AiError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            parse_generate_response(&body)
        })
    }
}
