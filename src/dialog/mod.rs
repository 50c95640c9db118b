//! The shared conversation record.

pub mod event;
pub mod history;

pub use event::{DialogEvent, ParticipantKind, ParticipantRef, SpokenAudioEvent, TypedTextEvent};
pub use history::{DialogHistory, EventHandler, HandlerId, Subscription};
