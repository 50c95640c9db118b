//! An AI persona that answers every user turn, one at a time.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::{AiPrompt, ResponsePipeline};
use crate::audio::WavAudio;
use crate::config::Settings;
use crate::dialog::{DialogEvent, DialogHistory, ParticipantKind, ParticipantRef, SpokenAudioEvent};
use crate::error::{Cancelled, TransportError};
use crate::transport::AudioTransport;
use crate::tts::SpeechSynthesizer;

pub struct AssistantParticipant {
    identity: ParticipantRef,
    description: String,
    greeting: String,
    /// Spoken before each AI call when responses are slow.
    thinking: Option<String>,
    pipeline: ResponsePipeline,
    tts: Arc<SpeechSynthesizer>,
    transport: Arc<dyn AudioTransport>,
}

impl AssistantParticipant {
    pub fn new(
        name: &str,
        description: &str,
        greeting: &str,
        thinking: Option<String>,
        pipeline: ResponsePipeline,
        tts: Arc<SpeechSynthesizer>,
        transport: Arc<dyn AudioTransport>,
    ) -> Self {
        Self {
            identity: ParticipantRef::new(name, ParticipantKind::Assistant),
            description: description.to_string(),
            greeting: greeting.to_string(),
            thinking,
            pipeline,
            tts,
            transport,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        pipeline: ResponsePipeline,
        tts: Arc<SpeechSynthesizer>,
        transport: Arc<dyn AudioTransport>,
    ) -> Self {
        Self::new(
            &settings.assistant_name,
            &settings.assistant_desc,
            &settings.assistant_greeting,
            settings.slow_ai_responses.then(|| settings.thinking.clone()),
            pipeline,
            tts,
            transport,
        )
    }

    pub fn identity(&self) -> &ParticipantRef {
        &self.identity
    }

    /// Greet, then answer user turns in the order they were appended.
    pub async fn run(self, history: Arc<DialogHistory>, cancel: CancellationToken) -> Result<(), TransportError> {
        info!(participant = %self.identity, "Assistant participant started");

        let (tx, mut turns) = mpsc::unbounded_channel::<Arc<DialogEvent>>();
        let _subscription = history.subscribe(move |event: &Arc<DialogEvent>, _: &DialogHistory| {
            if event.author().is_user() {
                tx.send(Arc::clone(event))
                    .map_err(|_| anyhow!("assistant stopped, turn not queued"))?;
            }
            Ok(())
        });

        let result = self.serve(&history, &mut turns, &cancel).await;
        info!(participant = %self.identity, "Assistant participant stopped");
        result
    }

    async fn serve(
        &self,
        history: &DialogHistory,
        turns: &mut mpsc::UnboundedReceiver<Arc<DialogEvent>>,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        if !self.greeting.trim().is_empty() {
            match self.tts.synthesize(&self.greeting, cancel).await {
                Ok(audio) => self.speak(history, self.greeting.clone(), audio).await?,
                Err(Cancelled) => return Ok(()),
            }
        }

        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = turns.recv() => match next {
                    Some(event) => event,
                    None => return Ok(()),
                },
            };
            self.respond(history, &trigger, cancel).await?;
        }
    }

    /// Generate, synthesize and speak the reply to `trigger`. Returns early,
    /// without speaking, when shutdown interrupts a wait.
    async fn respond(
        &self,
        history: &DialogHistory,
        trigger: &Arc<DialogEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        debug!(participant = %self.identity, trigger = %trigger.format_line(), "Responding");

        if let Some(thinking) = &self.thinking {
            let Ok(filler) = self.tts.cached(thinking, cancel).await else {
                return Ok(());
            };
            self.send_clip(&filler).await?;
        }

        let prompt = AiPrompt {
            assistant_name: self.identity.name.clone(),
            assistant_desc: self.description.clone(),
            user_name: trigger.author().name.clone(),
            last_user_input: trigger.text().to_string(),
            available_tools: Vec::new(),
        };
        let earlier = history.events_before(trigger);
        let Ok(response) = self.pipeline.get_response(&prompt, &earlier, cancel).await else {
            return Ok(());
        };

        let audio = if response.was_fallback {
            self.tts.cached(&response.text, cancel).await
        } else {
            self.tts.synthesize(&response.text, cancel).await
        };
        let Ok(audio) = audio else {
            return Ok(());
        };
        self.speak(history, response.text, audio).await
    }

    /// Append our turn to the log, then play it and release the clip.
    async fn speak(&self, history: &DialogHistory, text: String, audio: Arc<WavAudio>) -> Result<(), TransportError> {
        let event = history.append(SpokenAudioEvent::new(self.identity.clone(), text, audio));
        let Some(handle) = event.audio() else {
            return Ok(());
        };
        let result = match handle.get() {
            Some(clip) => self.send_clip(&clip).await,
            None => Ok(()),
        };
        handle.release();
        result
    }

    async fn send_clip(&self, clip: &WavAudio) -> Result<(), TransportError> {
        match self.transport.send(clip).await {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(participant = %self.identity, "Failed to send speech: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::GenerationParams;
    use crate::dialog::TypedTextEvent;
    use crate::participant::testing::{synthesizer, wait_until, ScriptedAi, ScriptedTransport};
    use indexmap::IndexMap;
    use std::time::Duration;

    const GREETING: &str = "Hi, I'm Jenny.";
    const FALLBACK: &str = "Hmm, not sure.";

    fn pipeline(ai: Arc<ScriptedAi>) -> ResponsePipeline {
        let params = GenerationParams {
            stop_sequence: vec!["User:".into(), "Jenny:".into()],
            ..GenerationParams::default()
        };
        ResponsePipeline::new(
            ai,
            params,
            IndexMap::from([("\u{200b}".to_string(), String::new())]),
            FALLBACK.into(),
            Duration::from_secs(1),
        )
    }

    fn assistant(
        ai: Arc<ScriptedAi>,
        thinking: Option<&str>,
        transport: Arc<ScriptedTransport>,
        tts: Arc<SpeechSynthesizer>,
    ) -> AssistantParticipant {
        AssistantParticipant::new(
            "Jenny",
            "friendly.",
            GREETING,
            thinking.map(str::to_string),
            pipeline(ai),
            tts,
            transport,
        )
    }

    fn lines(history: &DialogHistory) -> Vec<String> {
        history.snapshot().iter().map(|e| e.format_line()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_greets_then_answers_each_turn() {
        let cancel = CancellationToken::new();
        let ai = ScriptedAi::new(&[" It's 4.\u{200b}User: next question", "Sure."]);
        let transport = ScriptedTransport::new(vec![], cancel.clone());
        let history = DialogHistory::new();
        let user = ParticipantRef::new("User", ParticipantKind::User);

        let task = tokio::spawn(
            assistant(Arc::clone(&ai), None, Arc::clone(&transport), synthesizer())
                .run(Arc::clone(&history), cancel.clone()),
        );

        wait_until(|| history.len() == 1).await;
        history.append(TypedTextEvent::new(user.clone(), "What is two plus two?"));
        wait_until(|| history.len() == 3).await;
        history.append(TypedTextEvent::new(user, "Are you sure?"));
        wait_until(|| history.len() == 5).await;

        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(
            lines(&history),
            [
                "Jenny: Hi, I'm Jenny.",
                "User: What is two plus two?",
                "Jenny: It's 4.",
                "User: Are you sure?",
                "Jenny: Sure.",
            ]
        );
        assert_eq!(transport.sent(), [GREETING.len(), "It's 4.".len(), "Sure.".len()]);
        assert!(history
            .snapshot()
            .iter()
            .filter_map(|e| e.audio())
            .all(|handle| handle.is_released()));

        let prompts = ai.prompts.lock().unwrap();
        assert!(prompts[1].contains("User: What is two plus two?\nJenny: It's 4.\n"));
        assert!(prompts[1].ends_with("### Response\nJenny: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_reply_speaks_cached_fallback() {
        let cancel = CancellationToken::new();
        let ai = ScriptedAi::new(&["Jenny: "]);
        let transport = ScriptedTransport::new(vec![], cancel.clone());
        let tts = synthesizer();
        let history = DialogHistory::new();

        let task = tokio::spawn(
            assistant(ai, None, Arc::clone(&transport), Arc::clone(&tts))
                .run(Arc::clone(&history), cancel.clone()),
        );
        wait_until(|| history.len() == 1).await;
        history.append(TypedTextEvent::new(
            ParticipantRef::new("User", ParticipantKind::User),
            "Hello?",
        ));
        wait_until(|| history.len() == 3).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(history.snapshot()[2].text(), FALLBACK);
        assert!(tts.is_cached(FALLBACK));
        assert!(!tts.is_cached(GREETING));
    }

    #[tokio::test(start_paused = true)]
    async fn test_thinking_filler_precedes_answer() {
        let cancel = CancellationToken::new();
        let ai = ScriptedAi::new(&["Four."]);
        let transport = ScriptedTransport::new(vec![], cancel.clone());
        let history = DialogHistory::new();

        let task = tokio::spawn(
            assistant(ai, Some("Let me think about that."), Arc::clone(&transport), synthesizer())
                .run(Arc::clone(&history), cancel.clone()),
        );
        wait_until(|| history.len() == 1).await;
        history.append(TypedTextEvent::new(
            ParticipantRef::new("User", ParticipantKind::User),
            "Two plus two?",
        ));
        wait_until(|| history.len() == 3).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(
            transport.sent(),
            [GREETING.len(), "Let me think about that.".len(), "Four.".len()]
        );
        // The filler is not a conversational turn.
        assert_eq!(lines(&history)[2], "Jenny: Four.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_turns_do_not_trigger_replies() {
        let cancel = CancellationToken::new();
        let ai = ScriptedAi::new(&[]);
        let transport = ScriptedTransport::new(vec![], cancel.clone());
        let history = DialogHistory::new();

        let task = tokio::spawn(
            assistant(Arc::clone(&ai), None, transport, synthesizer()).run(Arc::clone(&history), cancel.clone()),
        );
        wait_until(|| history.len() == 1).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert!(ai.prompts.lock().unwrap().is_empty());
        assert_eq!(history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_connection_is_fatal() {
        let cancel = CancellationToken::new();
        let transport = ScriptedTransport::broken("relay gone", cancel.clone());
        let history = DialogHistory::new();

        let err = assistant(ScriptedAi::new(&[]), None, transport, synthesizer())
            .run(Arc::clone(&history), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::ConnectionLost(_)));
        assert_eq!(history.handler_count(), 0);
    }
}
