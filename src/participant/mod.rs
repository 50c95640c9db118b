//! Conversation participants: humans behind a transport and AI personas.
//!
//! Each participant runs as its own task against the shared
//! [`DialogHistory`]; none of them owns it.

pub mod assistant;
pub mod attention;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dialog::{DialogHistory, ParticipantRef};
use crate::error::TransportError;

pub use assistant::AssistantParticipant;
pub use attention::{Attention, AttentionState, Silence, Verdict};
pub use user::{UserParticipant, UserPhrases};

pub enum Participant {
    User(UserParticipant),
    Assistant(AssistantParticipant),
}

impl Participant {
    pub fn identity(&self) -> &ParticipantRef {
        match self {
            Self::User(user) => user.identity(),
            Self::Assistant(assistant) => assistant.identity(),
        }
    }

    pub fn name(&self) -> &str {
        &self.identity().name
    }

    /// Run until `cancel` fires. An `Err` is a fatal transport failure.
    pub async fn run(self, history: Arc<DialogHistory>, cancel: CancellationToken) -> Result<(), TransportError> {
        match self {
            Self::User(user) => user.run(history, cancel).await,
            Self::Assistant(assistant) => assistant.run(history, cancel).await,
        }
    }
}

impl From<UserParticipant> for Participant {
    fn from(user: UserParticipant) -> Self {
        Self::User(user)
    }
}

impl From<AssistantParticipant> for Participant {
    fn from(assistant: AssistantParticipant) -> Self {
        Self::Assistant(assistant)
    }
}
