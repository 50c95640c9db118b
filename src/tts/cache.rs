//! Retrying synthesizer with a phrase cache.
//!
//! Fixed phrases (reprompts, acknowledgements, the fallback reply) are
//! synthesized once at startup and replayed from memory afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::TtsEngine;
use crate::audio::WavAudio;
use crate::error::Cancelled;
use crate::retry::retry_forever;

/// Cache key for a phrase.
fn phrase_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Shared front end to a [`TtsEngine`].
pub struct SpeechSynthesizer {
    engine: Box<dyn TtsEngine>,
    cache: Mutex<HashMap<String, Arc<WavAudio>>>,
    retry_delay: Duration,
}

impl SpeechSynthesizer {
    pub fn new(engine: Box<dyn TtsEngine>, retry_delay: Duration) -> Self {
        Self {
            engine,
            cache: Mutex::new(HashMap::new()),
            retry_delay,
        }
    }

    pub fn engine_name(&self) -> String {
        self.engine.name()
    }

    /// Synthesize `text`, retrying failures until success or cancellation.
    pub async fn synthesize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<WavAudio>, Cancelled> {
        let audio = retry_forever("speech synthesis", self.retry_delay, cancel, |_| {
            self.engine.synthesize(text)
        })
        .await?;
        Ok(Arc::new(audio))
    }

    /// Like [`synthesize`](Self::synthesize), but served from and stored in the cache.
    pub async fn cached(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<WavAudio>, Cancelled> {
        let key = phrase_key(text);
        if let Some(hit) = self.lookup(&key) {
            debug!(key = %&key[..12], "TTS cache hit");
            return Ok(hit);
        }

        let audio = self.synthesize(text, cancel).await?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&audio));
        Ok(audio)
    }

    /// Pre-synthesize `phrases` so their first use is instant.
    pub async fn warm_up<'a, I>(&self, phrases: I, cancel: &CancellationToken) -> Result<(), Cancelled>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut count = 0usize;
        for phrase in phrases {
            if phrase.trim().is_empty() {
                continue;
            }
            self.cached(phrase, cancel).await?;
            count += 1;
        }
        info!(phrases = count, engine = %self.engine.name(), "TTS warm-up complete");
        Ok(())
    }

    pub fn is_cached(&self, text: &str) -> bool {
        self.lookup(&phrase_key(text)).is_some()
    }

    fn lookup(&self, key: &str) -> Option<Arc<WavAudio>> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}
