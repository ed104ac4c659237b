//! Speech output capability. Fire-and-forget: nothing is awaited or returned.

use tracing::info;

pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str);
}

/// Writes what would be spoken to the log and stdout.
pub struct LogSpeech;

impl SpeechOutput for LogSpeech {
    fn speak(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        info!(text, "speak");
        println!("🔊 {text}");
    }
}
