//! Console capture: each utterance is one transcript line read from a text
//! source (stdin by default). Used when no speech-to-text service is wired in.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CaptureError, Utterance, UtteranceCapture};

type LineSource = Box<dyn AsyncBufRead + Send + Unpin>;

pub struct ConsoleCapture {
    reader: Mutex<LineSource>,
    listening: AtomicBool,
    /// Replaced at the start of every listen; `abort` cancels it.
    abort_token: parking_lot::Mutex<CancellationToken>,
}

impl ConsoleCapture {
    /// Read transcripts from stdin.
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Mutex::new(Box::new(reader)),
            listening: AtomicBool::new(false),
            abort_token: parking_lot::Mutex::new(CancellationToken::new()),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

/// Clears the listening flag on every exit path, including a dropped future.
struct ListeningGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ListeningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl UtteranceCapture for ConsoleCapture {
    fn listen_for_utterance(&self) -> BoxFuture<'_, Result<Utterance, CaptureError>> {
        async move {
            if self.listening.swap(true, Ordering::SeqCst) {
                return Err(CaptureError::AlreadyListening);
            }
            let _guard = ListeningGuard {
                flag: &self.listening,
            };
            let cancelled = CancellationToken::new();
            *self.abort_token.lock() = cancelled.clone();

            info!("say something (type the transcript and press enter)");
            let mut line = String::new();
            let mut reader = self.reader.lock().await;
            let read = tokio::select! {
                _ = cancelled.cancelled() => return Err(CaptureError::Aborted),
                read = reader.read_line(&mut line) => {
                    read.map_err(|e| CaptureError::Failed(format!("read transcript: {e}")))?
                }
            };
            drop(reader);

            if read == 0 {
                return Err(CaptureError::Failed("transcript source closed".into()));
            }
            let utterance = line.trim();
            if utterance.is_empty() {
                return Err(CaptureError::NoSpeech);
            }

            debug!(len = utterance.len(), "console_utterance_captured");
            Ok(Utterance {
                utterance: utterance.to_string(),
                confidence: 1.0,
            })
        }
        .boxed()
    }

    fn abort(&self) -> BoxFuture<'_, ()> {
        async move {
            debug!(listening = self.is_listening(), "console_capture_abort");
            self.abort_token.lock().cancel();
        }
        .boxed()
    }
}
