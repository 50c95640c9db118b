//! Voice dialog engine.
//!
//! Participants (a human behind an audio transport, an AI persona) take
//! turns on a shared, append-only [`dialog::DialogHistory`]. The assistant
//! answers each user turn through a budgeted prompt, a retrying backend
//! call and speech synthesis; transports never transcribe their own speech.

pub mod ai;
pub mod audio;
pub mod config;
pub mod dialog;
pub mod error;
pub mod logger;
pub mod participant;
pub mod retry;
pub mod service;
pub mod stt;
pub mod transport;
pub mod tts;
