//! Error types for the dialog engine.
//!
//! Recognition noise (empty transcripts, known hallucinations) is deliberately
//! absent here: it is not an error, see [`crate::stt::Recognition`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Settings could not be loaded or resolved. Always fatal at startup.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("cyclic or unsatisfiable dependencies between settings: {}", keys.join(", "))]
    Cyclic { keys: Vec<String> },

    #[error("setting {key} references unknown setting {reference}")]
    UnknownReference { key: String, reference: String },

    #[error("failed to read settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("settings file {} must contain a JSON object", .0.display())]
    NotAnObject(PathBuf),

    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// A single call to the language-model backend failed. Retried by the caller.
#[derive(Error, Debug)]
pub enum AiError {
    #[error("AI backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("AI backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("AI backend response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("AI backend response has no results[0].text")]
    MissingText,
}

/// Errors surfaced by a remote voice-chat channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The connection is gone; nothing more can be sent or received.
    #[error("voice channel closed: {0}")]
    Closed(String),

    /// A single frame could not be sent or decoded; the channel is still usable.
    #[error("voice channel hiccup: {0}")]
    Transient(String),
}

/// Errors from an audio transport (remote channel or local devices).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio send did not finish within {0:?}")]
    Timeout(Duration),

    #[error("audio format error: {0}")]
    Audio(String),
}

impl TransportError {
    /// Fatal errors end the owning participant's task.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::Device(_))
    }
}

impl From<ChannelError> for TransportError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Closed(reason) => Self::ConnectionLost(reason),
            ChannelError::Transient(reason) => Self::Audio(reason),
        }
    }
}

impl From<hound::Error> for TransportError {
    fn from(err: hound::Error) -> Self {
        Self::Audio(err.to_string())
    }
}

/// Why the dialog service stopped before it was asked to.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("participant {participant} failed: {reason}")]
    ParticipantFailed { participant: String, reason: String },

    #[error("participant {0} stopped before shutdown was requested")]
    ParticipantExited(String),

    #[error("participant task panicked: {0}")]
    Panicked(String),
}

/// The surrounding task was cancelled while waiting.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;
