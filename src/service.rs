//! Runs every participant concurrently and stops them together.
//!
//! The first participant to fail, panic or return before shutdown was
//! requested brings the whole service down; a half-alive conversation is
//! not a mode we support.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::ai::{KoboldClient, ResponsePipeline};
use crate::config::Settings;
use crate::dialog::DialogHistory;
use crate::error::{ServiceError, TransportError};
use crate::participant::{AssistantParticipant, Participant, UserParticipant};
use crate::stt::{create_stt_engine, SttEngine};
use crate::transport::create_transport;
use crate::tts::{create_tts_engine, SpeechSynthesizer};

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type Exit = Result<(String, Result<(), TransportError>), JoinError>;

pub struct DialogService {
    participants: Vec<Participant>,
    history: Arc<DialogHistory>,
    shutdown_grace: Duration,
}

impl DialogService {
    pub fn new(participants: Vec<Participant>) -> Self {
        Self {
            participants,
            history: DialogHistory::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn history(&self) -> Arc<DialogHistory> {
        Arc::clone(&self.history)
    }

    /// Build the configured user and assistant around one shared transport.
    ///
    /// Synthesizes the fixed phrases up front, so this can take a while with
    /// a slow TTS backend; `cancel` aborts the wait.
    pub async fn from_settings(settings: &Settings, cancel: &CancellationToken) -> anyhow::Result<Self> {
        let tts = Arc::new(SpeechSynthesizer::new(
            create_tts_engine(settings)?,
            settings.tts_retry_delay(),
        ));
        let mut phrases = vec![
            settings.silent_period_prompt.as_str(),
            settings.non_committal_response.as_str(),
            settings.going_to_sleep.as_str(),
            settings.waking_up.as_str(),
        ];
        if settings.slow_ai_responses {
            phrases.push(settings.thinking.as_str());
        }
        info!(tts = %tts.engine_name(), phrases = phrases.len(), "Warming up speech cache");
        tts.warm_up(phrases, cancel).await?;

        let stt: Arc<dyn SttEngine> = Arc::from(create_stt_engine(settings)?);
        let transport = create_transport(settings, stt).await?;

        let user = UserParticipant::from_settings(settings, Arc::clone(&transport), Arc::clone(&tts));
        let pipeline = ResponsePipeline::from_settings(Arc::new(KoboldClient::new(&settings.generate_url)), settings);
        let assistant = AssistantParticipant::from_settings(settings, pipeline, tts, transport);

        Ok(Self::new(vec![user.into(), assistant.into()]))
    }

    /// Run until `cancel` fires or a participant stops on its own.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServiceError> {
        let Self {
            participants,
            history,
            shutdown_grace,
        } = self;
        let stop = cancel.child_token();
        let mut tasks = JoinSet::new();

        for participant in participants {
            let name = participant.name().to_string();
            info!(participant = %name, "Starting participant");
            let run = participant.run(Arc::clone(&history), stop.clone());
            tasks.spawn(async move { (name, run.await) });
        }

        let outcome = tokio::select! {
            _ = stop.cancelled() => Ok(()),
            Some(exit) = tasks.join_next() => first_exit(exit, cancel.is_cancelled()),
        };
        if outcome.is_err() {
            error!("Stopping all participants");
        } else {
            info!("Shutting down dialog service");
        }
        stop.cancel();

        let drain = async {
            while let Some(exit) = tasks.join_next().await {
                log_exit(exit);
            }
        };
        if tokio::time::timeout(shutdown_grace, drain).await.is_err() {
            warn!(grace = ?shutdown_grace, "Participants did not stop in time, aborting");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        history.close();
        info!(events = history.len(), "Dialog service stopped");
        outcome
    }
}

/// Interpret the first task to finish.
fn first_exit(exit: Exit, shutting_down: bool) -> Result<(), ServiceError> {
    match exit {
        Ok((name, Ok(()))) if shutting_down => {
            info!(participant = %name, "Participant stopped");
            Ok(())
        }
        Ok((name, Ok(()))) => {
            error!(participant = %name, "Participant stopped before shutdown was requested");
            Err(ServiceError::ParticipantExited(name))
        }
        Ok((name, Err(e))) => {
            error!(participant = %name, error = %e, "Participant failed");
            Err(ServiceError::ParticipantFailed {
                participant: name,
                reason: e.to_string(),
            })
        }
        Err(e) => {
            error!("Participant task panicked: {}", e);
            Err(ServiceError::Panicked(e.to_string()))
        }
    }
}

fn log_exit(exit: Exit) {
    match exit {
        Ok((name, Ok(()))) => info!(participant = %name, "Participant stopped"),
        Ok((name, Err(e))) => warn!(participant = %name, error = %e, "Participant failed during shutdown"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!("Participant task panicked during shutdown: {}", e),
    }
}
