//! A human speaking through an audio transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use super::attention::{Attention, Silence, Verdict};
use crate::config::Settings;
use crate::dialog::{DialogEvent, DialogHistory, ParticipantKind, ParticipantRef, TypedTextEvent};
use crate::error::TransportError;
use crate::stt::{classify, Recognition};
use crate::transport::AudioTransport;
use crate::tts::SpeechSynthesizer;

/// Acknowledgements the user loop speaks itself.
#[derive(Debug, Clone)]
pub struct UserPhrases {
    pub going_to_sleep: String,
    pub waking_up: String,
    pub silent_period_prompt: String,
}

impl UserPhrases {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            going_to_sleep: settings.going_to_sleep.clone(),
            waking_up: settings.waking_up.clone(),
            silent_period_prompt: settings.silent_period_prompt.clone(),
        }
    }
}

pub struct UserParticipant {
    identity: ParticipantRef,
    transport: Arc<dyn AudioTransport>,
    tts: Arc<SpeechSynthesizer>,
    attention: Attention,
    hallucinations: Vec<String>,
    listen_window: Duration,
    phrases: UserPhrases,
    /// Set when our turn is appended, cleared by the next assistant turn.
    awaiting_reply: Arc<AtomicBool>,
}

impl UserParticipant {
    pub fn new(
        name: &str,
        transport: Arc<dyn AudioTransport>,
        tts: Arc<SpeechSynthesizer>,
        attention: Attention,
        hallucinations: Vec<String>,
        listen_window: Duration,
        phrases: UserPhrases,
    ) -> Self {
        Self {
            identity: ParticipantRef::new(name, ParticipantKind::User),
            transport,
            tts,
            attention,
            hallucinations,
            listen_window,
            phrases,
            awaiting_reply: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_settings(
        settings: &Settings,
        transport: Arc<dyn AudioTransport>,
        tts: Arc<SpeechSynthesizer>,
    ) -> Self {
        Self::new(
            &settings.user_name,
            transport,
            tts,
            Attention::new(
                &settings.sleep_command,
                &settings.wake_command,
                settings.silence_reprompt_periods_max,
            ),
            settings.stt_hallucinations.clone(),
            settings.listen_window(),
            UserPhrases::from_settings(settings),
        )
    }

    pub fn identity(&self) -> &ParticipantRef {
        &self.identity
    }

    /// Drive the transport and the listen loop until cancelled or the transport fails.
    pub async fn run(mut self, history: Arc<DialogHistory>, cancel: CancellationToken) -> Result<(), TransportError> {
        info!(participant = %self.identity, transport = %self.transport.name(), "User participant started");

        // Echo the conversation to the console as it happens.
        let awaiting_reply = Arc::clone(&self.awaiting_reply);
        let _transcript = history.subscribe(move |event: &Arc<DialogEvent>, _: &DialogHistory| {
            info!(target: "dialog", "{}", event.format_line());
            if event.author().kind == ParticipantKind::Assistant {
                awaiting_reply.store(false, Ordering::Release);
            }
            Ok(())
        });

        let transport = Arc::clone(&self.transport);
        let result = tokio::select! {
            result = transport.run(&cancel) => result,
            result = self.listen_loop(&history, &cancel) => result,
        };

        info!(participant = %self.identity, "User participant stopped");
        result
    }

    async fn listen_loop(&mut self, history: &DialogHistory, cancel: &CancellationToken) -> Result<(), TransportError> {
        loop {
            let heard = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                heard = self.transport.listen(self.listen_window) => heard,
            };
            let heard = match heard {
                Ok(heard) => heard,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(participant = %self.identity, "Listen failed: {}", e);
                    None
                }
            };

            match classify(heard.as_deref(), &self.hallucinations) {
                Recognition::Recognized(text) => self.on_utterance(text, history, cancel).await?,
                Recognition::NoInput | Recognition::Hallucination(_) => self.on_silence(cancel).await?,
            }
        }
    }

    async fn on_utterance(
        &mut self,
        text: String,
        history: &DialogHistory,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        match self.attention.observe_utterance(&text) {
            Verdict::Forward => {
                self.awaiting_reply.store(true, Ordering::Release);
                history.append(TypedTextEvent::new(self.identity.clone(), text));
                Ok(())
            }
            Verdict::FellAsleep => self.say(&self.phrases.going_to_sleep, cancel).await,
            Verdict::WokeUp => self.say(&self.phrases.waking_up, cancel).await,
            Verdict::Ignored => Ok(()),
        }
    }

    /// Silence only counts while nobody owes the user an answer.
    async fn on_silence(&mut self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let muted = self.transport.is_sending() || self.awaiting_reply.load(Ordering::Acquire);
        match self.attention.observe_silence(muted) {
            Silence::Reprompt => {
                info!(participant = %self.identity, "Prolonged silence, reprompting");
                self.say(&self.phrases.silent_period_prompt, cancel).await
            }
            Silence::Counted(cycles) => {
                trace!(cycles, "No input");
                Ok(())
            }
            Silence::Suppressed => Ok(()),
        }
    }

    /// Speak a cached phrase. Only fatal transport errors propagate.
    async fn say(&self, phrase: &str, cancel: &CancellationToken) -> Result<(), TransportError> {
        if phrase.trim().is_empty() {
            return Ok(());
        }
        let Ok(audio) = self.tts.cached(phrase, cancel).await else {
            return Ok(());
        };
        match self.transport.send(&audio).await {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(participant = %self.identity, "Failed to speak {:?}: {}", phrase, e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::testing::{synthesizer, ScriptedTransport};

    const WINDOW: Duration = Duration::from_secs(5);

    fn phrases() -> UserPhrases {
        UserPhrases {
            going_to_sleep: "Going to sleep.".into(),
            waking_up: "I'm awake.".into(),
            silent_period_prompt: "Are you still there?".into(),
        }
    }

    fn user(transport: Arc<ScriptedTransport>, max_silence: u32) -> UserParticipant {
        UserParticipant::new(
            "User",
            transport,
            synthesizer(),
            Attention::new("go to sleep", "wake up Jenny", max_silence),
            vec!["Thanks for watching!".into(), "you".into()],
            WINDOW,
            phrases(),
        )
    }

    fn texts(history: &DialogHistory) -> Vec<String> {
        history.snapshot().iter().map(|e| e.format_line()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_recognized_speech_is_appended() {
        let cancel = CancellationToken::new();
        let transport = ScriptedTransport::new(
            vec![Some(" What is two plus two? "), None, Some("Thanks for watching!"), Some("")],
            cancel.clone(),
        );
        let history = DialogHistory::new();

        user(Arc::clone(&transport), 10)
            .run(Arc::clone(&history), cancel)
            .await
            .unwrap();

        assert_eq!(texts(&history), ["User: What is two plus two?"]);
        assert!(matches!(*history.snapshot()[0], DialogEvent::TypedText(_)));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_asleep_user_is_not_heard() {
        let cancel = CancellationToken::new();
        let transport = ScriptedTransport::new(
            vec![
                Some("Go To Sleep!"),
                Some("What is the weather?"),
                Some("Wake up, Jenny."),
                Some("Tell me a joke"),
            ],
            cancel.clone(),
        );
        let history = DialogHistory::new();

        user(Arc::clone(&transport), 10)
            .run(Arc::clone(&history), cancel)
            .await
            .unwrap();

        assert_eq!(texts(&history), ["User: Tell me a joke"]);
        assert_eq!(
            transport.sent(),
            ["Going to sleep.".len(), "I'm awake.".len()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_prolonged_silence_reprompts() {
        let cancel = CancellationToken::new();
        let transport = ScriptedTransport::new(vec![None, Some("you"), None, None, None], cancel.clone());
        let history = DialogHistory::new();

        user(Arc::clone(&transport), 2)
            .run(Arc::clone(&history), cancel)
            .await
            .unwrap();

        assert!(history.is_empty());
        assert_eq!(transport.sent(), ["Are you still there?".len()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_listen_error_ends_the_task() {
        let cancel = CancellationToken::new();
        let transport = ScriptedTransport::new(vec![], cancel.clone());
        transport.push_error(TransportError::Audio("garbled".into()));
        transport.push_error(TransportError::ConnectionLost("relay gone".into()));

        let err = user(Arc::clone(&transport), 10)
            .run(DialogHistory::new(), cancel.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::ConnectionLost(_)));
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transcript_subscription_is_dropped_on_exit() {
        let cancel = CancellationToken::new();
        let transport = ScriptedTransport::new(vec![], cancel.clone());
        let history = DialogHistory::new();

        user(transport, 10).run(Arc::clone(&history), cancel).await.unwrap();

        assert_eq!(history.handler_count(), 0);
    }
}
