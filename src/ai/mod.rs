//! Language-model replies: prompt budgeting, backend client, clean-up pipeline.

pub mod client;
pub mod params;
pub mod pipeline;
pub mod prompt;

pub use client::{AiClient, GenerateRequest, KoboldClient};
pub use params::GenerationParams;
pub use pipeline::{AiResponse, ResponsePipeline};
pub use prompt::{build_prompt, AiPrompt};
