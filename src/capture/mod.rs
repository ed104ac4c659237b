//! Utterance capture capability.
//! One call to `listen_for_utterance` is one listen-and-transcribe cycle.
//! Implementations reject overlapping cycles with `AlreadyListening`.

pub mod console;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use console::ConsoleCapture;

/// A transcribed span of speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub utterance: String,
    /// Recognizer confidence in `0.0..=1.0`.
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("speech recognition not supported on this platform")]
    NotSupported,
    #[error("speech recognition is already listening")]
    AlreadyListening,
    #[error("capture aborted")]
    Aborted,
    #[error("no speech detected")]
    NoSpeech,
    #[error("capture failed: {0}")]
    Failed(String),
}

/// Platform adapter for speech-to-text.
pub trait UtteranceCapture: Send + Sync {
    /// Listen for one utterance and transcribe it.
    fn listen_for_utterance(&self) -> BoxFuture<'_, Result<Utterance, CaptureError>>;

    /// Cancel an in-flight capture. Completes even if nothing is in flight.
    fn abort(&self) -> BoxFuture<'_, ()>;
}
