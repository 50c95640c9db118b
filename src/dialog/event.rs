//! Dialog events and the participant identities that author them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audio::{AudioHandle, WavAudio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantKind {
    User,
    Assistant,
}

/// Lookup key for the participant that authored an event.
///
/// Events never own their author; the id is stable for the participant's life.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantRef {
    pub id: Uuid,
    pub name: String,
    pub kind: ParticipantKind,
}

impl ParticipantRef {
    pub fn new(name: impl Into<String>, kind: ParticipantKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
        }
    }

    pub fn is_user(&self) -> bool {
        self.kind == ParticipantKind::User
    }
}

impl fmt::Display for ParticipantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Text said or typed by a participant.
#[derive(Debug, Clone)]
pub struct TypedTextEvent {
    pub timestamp: DateTime<Utc>,
    pub participant: ParticipantRef,
    pub text: String,
}

impl TypedTextEvent {
    pub fn new(participant: ParticipantRef, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            participant,
            text: text.into(),
        }
    }
}

/// Text together with the audio it was spoken as.
#[derive(Debug, Clone)]
pub struct SpokenAudioEvent {
    pub spoken: TypedTextEvent,
    pub audio: AudioHandle,
}

impl SpokenAudioEvent {
    pub fn new(participant: ParticipantRef, text: impl Into<String>, audio: Arc<WavAudio>) -> Self {
        Self {
            spoken: TypedTextEvent::new(participant, text),
            audio: AudioHandle::new(audio),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DialogEvent {
    TypedText(TypedTextEvent),
    SpokenAudio(SpokenAudioEvent),
}

impl DialogEvent {
    fn typed(&self) -> &TypedTextEvent {
        match self {
            Self::TypedText(event) => event,
            Self::SpokenAudio(event) => &event.spoken,
        }
    }

    pub fn author(&self) -> &ParticipantRef {
        &self.typed().participant
    }

    pub fn text(&self) -> &str {
        &self.typed().text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.typed().timestamp
    }

    pub fn audio(&self) -> Option<&AudioHandle> {
        match self {
            Self::TypedText(_) => None,
            Self::SpokenAudio(event) => Some(&event.audio),
        }
    }

    /// `"{name}: {text}"`, the transcript line used in prompts and logs.
    pub fn format_line(&self) -> String {
        format!("{}: {}", self.author().name, self.text())
    }
}

impl From<TypedTextEvent> for DialogEvent {
    fn from(event: TypedTextEvent) -> Self {
        Self::TypedText(event)
    }
}

impl From<SpokenAudioEvent> for DialogEvent {
    fn from(event: SpokenAudioEvent) -> Self {
        Self::SpokenAudio(event)
    }
}
