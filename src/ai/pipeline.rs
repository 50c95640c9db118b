//! Backend call with unlimited retry, then reply clean-up.
//!
//! Raw text is cut at the earliest stop word occurrence, trimmed and
//! remapped for speech. An empty result becomes the non-committal fallback
//! instead of another generation.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::client::{AiClient, GenerateRequest};
use super::params::GenerationParams;
use super::prompt::{build_prompt, AiPrompt};
use crate::config::Settings;
use crate::dialog::DialogEvent;
use crate::error::Cancelled;
use crate::retry::retry_forever;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiResponse {
    pub text: String,
    pub was_fallback: bool,
}

/// Cut `text` at the earliest occurrence of any stop word.
pub fn truncate_at_stop_words<'a>(text: &'a str, stop_words: &[String]) -> &'a str {
    stop_words
        .iter()
        .filter(|w| !w.is_empty())
        .filter_map(|w| text.find(w.as_str()))
        .min()
        .map_or(text, |idx| &text[..idx])
}

/// Apply literal substring replacements in table order.
pub fn apply_remaps(text: &str, remaps: &IndexMap<String, String>) -> String {
    remaps
        .iter()
        .filter(|(from, _)| !from.is_empty())
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
}

/// Stop-word truncation, trim, remap. `None` when nothing usable is left.
pub fn sanitize(raw: &str, stop_words: &[String], remaps: &IndexMap<String, String>) -> Option<String> {
    let cut = truncate_at_stop_words(raw, stop_words).trim();
    let remapped = apply_remaps(cut, remaps);
    let text = remapped.trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub struct ResponsePipeline {
    client: Arc<dyn AiClient>,
    params: GenerationParams,
    stop_words: Vec<String>,
    remaps: IndexMap<String, String>,
    fallback: String,
    retry_delay: Duration,
}

impl ResponsePipeline {
    pub fn new(
        client: Arc<dyn AiClient>,
        params: GenerationParams,
        remaps: IndexMap<String, String>,
        fallback: String,
        retry_delay: Duration,
    ) -> Self {
        Self {
            client,
            stop_words: params.stop_sequence.clone(),
            params,
            remaps,
            fallback,
            retry_delay,
        }
    }

    pub fn from_settings(client: Arc<dyn AiClient>, settings: &Settings) -> Self {
        Self::new(
            client,
            GenerationParams::from_settings(settings),
            settings.ai_text_to_speech_remappings.clone(),
            settings.non_committal_response.clone(),
            settings.ai_retry_delay(),
        )
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Produce the assistant's reply to `prompt` given the preceding `history`.
    pub async fn get_response(
        &self,
        prompt: &AiPrompt,
        history: &[Arc<DialogEvent>],
        cancel: &CancellationToken,
    ) -> Result<AiResponse, Cancelled> {
        let text = build_prompt(prompt, history, self.params.max_context_length);
        let request = GenerateRequest::new(text, &self.params);

        let raw = retry_forever("AI generation", self.retry_delay, cancel, |_| {
            self.client.generate(&request)
        })
        .await?;
        debug!(raw = %raw, "AI raw response");

        match sanitize(&raw, &self.stop_words, &self.remaps) {
            Some(text) => Ok(AiResponse {
                text,
                was_fallback: false,
            }),
            None => {
                info!(raw = %raw, "AI response empty after clean-up, using fallback");
                Ok(AiResponse {
                    text: self.fallback.clone(),
                    was_fallback: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::parse_generate_response;
    use crate::error::AiError;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Replays canned backend bodies; `None` simulates an unreachable backend.
    struct ScriptedClient {
        replies: Mutex<Vec<Option<&'static str>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    impl AiClient for ScriptedClient {
        fn generate<'a>(
            &'a self,
            request: &'a GenerateRequest,
        ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
            Box::pin(async move {
                self.prompts.lock().unwrap().push(request.prompt.clone());
                let next = self.replies.lock().unwrap().remove(0);
                match next {
                    Some(body) => parse_generate_response(body),
                    None => Err(AiError::Status {
                        status: 503,
                        body: "loading model".into(),
                    }),
                }
            })
        }
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    fn zero_width_remap() -> IndexMap<String, String> {
        IndexMap::from([("\u{200b}".to_string(), String::new())])
    }

    fn pipeline(client: Arc<ScriptedClient>) -> ResponsePipeline {
        let params = GenerationParams {
            stop_sequence: words(&["User:", "Jenny:", "###"]),
            ..GenerationParams::default()
        };
        ResponsePipeline::new(
            client,
            params,
            zero_width_remap(),
            "Hmm, I'm not sure.".into(),
            Duration::from_secs(2),
        )
    }

    fn prompt() -> AiPrompt {
        AiPrompt {
            assistant_name: "Jenny".into(),
            assistant_desc: "helpful.".into(),
            user_name: "User".into(),
            last_user_input: "What is two plus two?".into(),
            available_tools: Vec::new(),
        }
    }

    #[test]
    fn test_stop_word_truncation() {
        let out = sanitize("Hello there\nUser: ignore this", &words(&["User:"]), &IndexMap::new());
        assert_eq!(out.as_deref(), Some("Hello there"));
    }

    #[test]
    fn test_earliest_stop_word_wins() {
        let text = "one ### two User: three";
        assert_eq!(truncate_at_stop_words(text, &words(&["User:", "###"])), "one ");
        assert_eq!(truncate_at_stop_words(text, &words(&["###", "User:"])), "one ");
        assert_eq!(truncate_at_stop_words(text, &words(&["", "none"])), text);
    }

    #[test]
    fn test_marker_before_later_listed_word_is_not_spoken() {
        let raw = "Sure thing.\n### Assistant: more rambling\nUser: hi";
        let stops = words(&["User:", "Jenny:", "### Assistant: "]);
        assert_eq!(sanitize(raw, &stops, &IndexMap::new()), Some("Sure thing.".to_string()));
    }

    #[test]
    fn test_stop_words_are_case_sensitive() {
        assert_eq!(truncate_at_stop_words("ask the user: now", &words(&["User:"])), "ask the user: now");
    }

    #[test]
    fn test_remaps_apply_in_order() {
        let remaps = IndexMap::from([
            ("%".to_string(), " percent".to_string()),
            (" = ".to_string(), " equals ".to_string()),
        ]);
        assert_eq!(apply_remaps("2 + 2 = 4, 100%", &remaps), "2 + 2 equals 4, 100 percent");
    }

    #[test]
    fn test_empty_after_cleanup_is_none() {
        assert_eq!(sanitize("  User: hi", &words(&["User:"]), &IndexMap::new()), None);
        assert_eq!(sanitize("\u{200b}", &[], &zero_width_remap()), None);
    }

    #[tokio::test]
    async fn test_end_to_end_reply_is_cleaned() {
        let client = ScriptedClient::new(vec![Some(
            r#"{"results":[{"text":" It's 4.\u200bUser: next question"}]}"#,
        )]);
        let pipeline = pipeline(Arc::clone(&client));
        let token = CancellationToken::new();

        let response = pipeline.get_response(&prompt(), &[], &token).await.unwrap();

        assert_eq!(
            response,
            AiResponse {
                text: "It's 4.".into(),
                was_fallback: false
            }
        );
        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].ends_with("User: What is two plus two?\n\n### Response\nJenny: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_retried_then_fallback_used() {
        let client = ScriptedClient::new(vec![None, None, Some(r#"{"results":[{"text":"Jenny: "}]}"#)]);
        let pipeline = pipeline(Arc::clone(&client));
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();

        let response = pipeline.get_response(&prompt(), &[], &token).await.unwrap();

        assert!(response.was_fallback);
        assert_eq!(response.text, "Hmm, I'm not sure.");
        assert_eq!(client.prompts.lock().unwrap().len(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_retry() {
        let client = ScriptedClient::new(vec![None; 100]);
        let pipeline = pipeline(client);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        assert_eq!(pipeline.get_response(&prompt(), &[], &token).await, Err(Cancelled));
    }
}
