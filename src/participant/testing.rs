//! Collaborator doubles shared by the participant and service tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ai::{AiClient, GenerateRequest};
use crate::audio::{PcmAudio, WavAudio};
use crate::error::{AiError, TransportError};
use crate::transport::{AudioTransport, TransportFuture};
use crate::tts::{SpeechSynthesizer, TtsEngine};

/// Synthesizes one silent sample per character, so clips identify their text by length.
pub struct LengthTts;

impl TtsEngine for LengthTts {
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WavAudio>> + Send + 'a>> {
        Box::pin(async move { Ok(PcmAudio::mono(vec![0.0; text.chars().count()], 16_000).encode_wav()?) })
    }

    fn name(&self) -> String {
        "length".into()
    }
}

/// Poll `condition` on the (usually paused) test clock until it holds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(600), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

pub fn synthesizer() -> Arc<SpeechSynthesizer> {
    Arc::new(SpeechSynthesizer::new(Box::new(LengthTts), Duration::from_millis(10)))
}

/// Sample count of a clip made by [`LengthTts`].
pub fn clip_len(audio: &WavAudio) -> usize {
    audio.decode().map(|pcm| pcm.samples.len()).unwrap_or(0)
}

/// Replays scripted listen results, then cancels `done`.
pub struct ScriptedTransport {
    heard: Mutex<VecDeque<Result<Option<String>, TransportError>>>,
    pub sent: Mutex<Vec<usize>>,
    done: CancellationToken,
    fail_run: Option<String>,
}

impl ScriptedTransport {
    pub fn new(heard: Vec<Option<&str>>, done: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            heard: Mutex::new(heard.into_iter().map(|h| Ok(h.map(str::to_string))).collect()),
            sent: Mutex::new(Vec::new()),
            done,
            fail_run: None,
        })
    }

    /// A transport whose `run` and `send` fail at once with a lost connection.
    pub fn broken(reason: &str, done: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            heard: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            done,
            fail_run: Some(reason.to_string()),
        })
    }

    pub fn push_error(&self, err: TransportError) {
        self.heard.lock().unwrap().push_back(Err(err));
    }

    pub fn sent(&self) -> Vec<usize> {
        self.sent.lock().unwrap().clone()
    }
}

impl AudioTransport for ScriptedTransport {
    fn run<'a>(&'a self, cancel: &'a CancellationToken) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            if let Some(reason) = &self.fail_run {
                return Err(TransportError::ConnectionLost(reason.clone()));
            }
            cancel.cancelled().await;
            Ok(())
        })
    }

    fn send<'a>(&'a self, audio: &'a WavAudio) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            if let Some(reason) = &self.fail_run {
                return Err(TransportError::ConnectionLost(reason.clone()));
            }
            self.sent.lock().unwrap().push(clip_len(audio));
            Ok(())
        })
    }

    fn listen(&self, window: Duration) -> TransportFuture<'_, Option<String>> {
        Box::pin(async move {
            tokio::time::sleep(window).await;
            let next = self.heard.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => {
                    self.done.cancel();
                    std::future::pending().await
                }
            }
        })
    }

    fn is_sending(&self) -> bool {
        false
    }

    fn name(&self) -> String {
        "scripted".into()
    }
}

/// Answers every request with the next scripted reply text.
pub struct ScriptedAi {
    replies: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedAi {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Self::delayed(replies, Duration::ZERO)
    }

    /// A backend that takes `delay` to produce each reply.
    pub fn delayed(replies: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            delay,
        })
    }
}

impl AiClient for ScriptedAi {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            tokio::time::sleep(self.delay).await;
            self.replies.lock().unwrap().pop_front().ok_or(AiError::MissingText)
        })
    }
}
