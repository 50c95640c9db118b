//! Sleep/wake gating and silence reprompting for a user's utterances.
//!
//! Pure state machine: callers feed it recognition outcomes and act on the
//! verdicts (speaking acknowledgements, appending turns).

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionState {
    Awake,
    Asleep,
}

/// What to do with a recognized utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Append it as a conversational turn.
    Forward,
    /// The sleep phrase was heard; acknowledge and stop forwarding.
    FellAsleep,
    /// The wake phrase was heard while asleep; acknowledge and resume.
    WokeUp,
    /// Heard while asleep; drop it.
    Ignored,
}

/// Outcome of a listen cycle that produced no valid input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Silence {
    /// Consecutive silent cycles so far.
    Counted(u32),
    /// The counter went past the limit and was reset; speak the reprompt.
    Reprompt,
    /// Asleep or muted; nothing counted.
    Suppressed,
}

/// Lowercase, keep only ASCII `a-z` and spaces, trim.
pub fn clean_as_command(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct Attention {
    state: AttentionState,
    sleep_phrase: String,
    wake_phrase: String,
    silent_cycles: u32,
    max_silent_cycles: u32,
}

impl Attention {
    pub fn new(sleep_command: &str, wake_command: &str, max_silent_cycles: u32) -> Self {
        Self {
            state: AttentionState::Awake,
            sleep_phrase: clean_as_command(sleep_command),
            wake_phrase: clean_as_command(wake_command),
            silent_cycles: 0,
            max_silent_cycles,
        }
    }

    pub fn state(&self) -> AttentionState {
        self.state
    }

    pub fn is_asleep(&self) -> bool {
        self.state == AttentionState::Asleep
    }

    pub fn observe_utterance(&mut self, text: &str) -> Verdict {
        let command = clean_as_command(text);
        match self.state {
            AttentionState::Awake if command == self.sleep_phrase => {
                info!("Sleep command heard, going to sleep");
                self.state = AttentionState::Asleep;
                self.silent_cycles = 0;
                Verdict::FellAsleep
            }
            AttentionState::Awake => {
                self.silent_cycles = 0;
                Verdict::Forward
            }
            AttentionState::Asleep if command == self.wake_phrase => {
                info!("Wake command heard, waking up");
                self.state = AttentionState::Awake;
                self.silent_cycles = 0;
                Verdict::WokeUp
            }
            AttentionState::Asleep => {
                warn!(text = %text, "Asleep, ignoring utterance");
                Verdict::Ignored
            }
        }
    }

    /// Record a cycle without valid input. `muted` is true while our own
    /// speech is playing or a reply to the user is still pending.
    pub fn observe_silence(&mut self, muted: bool) -> Silence {
        if self.is_asleep() || muted {
            return Silence::Suppressed;
        }
        self.silent_cycles += 1;
        if self.silent_cycles > self.max_silent_cycles {
            debug!(cycles = self.silent_cycles, "Silence limit reached");
            self.silent_cycles = 0;
            return Silence::Reprompt;
        }
        Silence::Counted(self.silent_cycles)
    }
}
