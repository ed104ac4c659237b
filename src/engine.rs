//! Voice intent engine: wake listening → utterance capture → intent parsing.
//!
//! A single driver task owns the capture cycle, so transitions never overlap.
//! Wake callbacks, manual triggers and abort requests are queued to it in
//! order; triggers that arrive while a capture is in flight are dropped. An
//! abort applies to the capture in flight or to the one queued ahead of it.
//! Every cycle, however it ends, returns the engine to `WakeListening` and
//! resumes wake listening exactly once.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cancellation::CaptureGeneration;
use crate::capture::{CaptureError, UtteranceCapture};
use crate::events::{EngineEvent, EventBus, EventKind, Subscription, SubscriptionId};
use crate::intent::IntentParser;
use crate::metrics::{metric_names, MetricsRegistry, RequestIds};
use crate::state_machine::{EngineState, StateMachine};
use crate::wakeword::{WakeModel, WakewordCapability, WakewordError};

/// Where the wakeword model comes from at `start()`.
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// JSON document on disk.
    File(PathBuf),
    Inline(WakeModel),
}

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("engine already started")]
    AlreadyStarted,
    #[error("failed to read wakeword model: {0}")]
    ModelRead(#[from] std::io::Error),
    #[error("failed to parse wakeword model: {0}")]
    ModelParse(#[from] serde_json::Error),
    #[error("failed to load wakeword model: {0}")]
    ModelLoad(#[source] WakewordError),
    #[error("failed to start wake listening: {0}")]
    StartListening(#[source] WakewordError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Wake,
    Manual,
    Abort,
}

struct EngineInner {
    wakeword: Arc<dyn WakewordCapability>,
    capture: Arc<dyn UtteranceCapture>,
    parser: IntentParser,
    state: StateMachine,
    events: EventBus,
    generation: CaptureGeneration,
    metrics: Arc<MetricsRegistry>,
    /// Set while the wakeword listener is started by us.
    wake_active: AtomicBool,
    commands: mpsc::UnboundedSender<Command>,
}

pub struct VoiceIntentEngine {
    inner: Arc<EngineInner>,
    model_source: ModelSource,
    /// Taken by a successful `start()`.
    pending_commands: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceIntentEngine {
    pub fn new(
        wakeword: Arc<dyn WakewordCapability>,
        capture: Arc<dyn UtteranceCapture>,
        parser: IntentParser,
        model_source: ModelSource,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(EngineInner {
                wakeword,
                capture,
                parser,
                state: StateMachine::new(),
                events: EventBus::new(),
                generation: CaptureGeneration::new(),
                metrics: Arc::new(MetricsRegistry::new()),
                wake_active: AtomicBool::new(false),
                commands,
            }),
            model_source,
            pending_commands: Mutex::new(Some(rx)),
            driver: Mutex::new(None),
        }
    }

    /// Load the wakeword model and begin wake listening.
    /// Failure leaves the engine unstarted; calling `start()` again retries.
    pub async fn start(&self) -> Result<(), InitializationError> {
        let rx = self
            .pending_commands
            .lock()
            .take()
            .ok_or(InitializationError::AlreadyStarted)?;

        if let Err(e) = self.initialize().await {
            error!(error = %e, "engine initialization failed");
            *self.pending_commands.lock() = Some(rx);
            return Err(e);
        }

        let handle = tokio::spawn(drive(Arc::clone(&self.inner), rx));
        *self.driver.lock() = Some(handle);
        info!(locale = self.inner.parser.locale(), "voice intent engine started");
        Ok(())
    }

    async fn initialize(&self) -> Result<(), InitializationError> {
        let model = match &self.model_source {
            ModelSource::File(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                serde_json::from_str::<WakeModel>(&raw)?
            }
            ModelSource::Inline(model) => model.clone(),
        };
        self.inner
            .wakeword
            .load_model(model)
            .map_err(InitializationError::ModelLoad)?;

        let commands = self.inner.commands.clone();
        self.inner.wakeword.on_keyword_spotted(Arc::new(move || {
            if commands.send(Command::Wake).is_err() {
                debug!("wake signal after engine shutdown");
            }
        }));

        self.inner
            .start_wake_listening()
            .await
            .map_err(InitializationError::StartListening)
    }

    /// Begin a capture without waiting for the wake phrase.
    pub fn start_speech_recognition(&self) {
        self.send(Command::Manual);
    }

    /// Abort the capture in flight, or the one already requested. The cycle
    /// then resumes wake listening. With nothing pending this is a no-op.
    pub async fn stop_speech_recognition(&self) {
        self.send(Command::Abort);
    }

    fn send(&self, command: Command) {
        if self.driver.lock().is_none() {
            warn!(command = ?command, "ignored: engine not started");
            return;
        }
        if self.inner.commands.send(command).is_err() {
            warn!(command = ?command, "ignored: engine driver stopped");
        }
    }

    /// Stop the driver and the wakeword listener. The engine cannot be restarted.
    pub async fn shutdown(&self) {
        self.inner.generation.cancel_current();
        let driver = self.driver.lock().take();
        if let Some(handle) = driver {
            handle.abort();
            let _ = handle.await;
        }
        self.inner.stop_wake_listening().await;
        info!("voice intent engine stopped");
    }

    /// True exactly when no capture is in flight.
    pub fn idle(&self) -> bool {
        self.inner.state.idle()
    }

    pub fn state(&self) -> EngineState {
        self.inner.state.current()
    }

    pub fn state_changes(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.events.subscribe()
    }

    pub fn subscribe_kind(&self, kind: EventKind) -> Subscription {
        self.inner.events.subscribe_kind(kind)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.inner.metrics)
    }
}

impl Drop for VoiceIntentEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.get_mut().take() {
            handle.abort();
        }
    }
}

async fn drive(inner: Arc<EngineInner>, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if command == Command::Abort {
            debug!("abort requested with no capture in flight");
            continue;
        }
        inner.capture_cycle(command, &mut commands).await;
        while let Ok(stale) = commands.try_recv() {
            debug!(command = ?stale, "dropped: arrived while the cycle settled");
        }
        inner.resume().await;
    }
}

impl EngineInner {
    async fn start_wake_listening(&self) -> Result<(), WakewordError> {
        if self.wake_active.swap(true, Ordering::SeqCst) {
            debug!("wake listening already active");
            return Ok(());
        }
        if let Err(e) = self.wakeword.start_listening().await {
            self.wake_active.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.events.emit(EngineEvent::WakeListenStart);
        Ok(())
    }

    async fn stop_wake_listening(&self) {
        if !self.wake_active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.wakeword.stop_listening().await {
            warn!(error = %e, "wakeword stop failed");
        }
        self.events.emit(EngineEvent::WakeListenStop);
    }

    async fn capture_cycle(
        &self,
        trigger: Command,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) {
        let guard = self.generation.advance();
        let ids = RequestIds::new(guard.my_generation());
        let span = info_span!(
            "capture_cycle",
            trace_id = %ids.trace_id,
            request_id = %ids.request_id,
            generation = ids.generation,
        );

        async {
            let cycle = self.metrics.span(metric_names::CYCLE_DONE);
            debug!(trigger = ?trigger, "capture cycle begins");

            if trigger == Command::Wake {
                self.events.emit(EngineEvent::WakeHeard);
            }
            self.stop_wake_listening().await;

            if self.state.transition(EngineState::Capturing).is_err() {
                return;
            }
            self.events.emit(EngineEvent::CaptureStart);

            let capture_timer = self.metrics.span(metric_names::CAPTURE_DONE);
            let mut listen = self.capture.listen_for_utterance();
            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = guard.token().cancelled() => break Err(CaptureError::Aborted),
                    command = commands.recv() => match command {
                        Some(Command::Abort) | None => {
                            info!("capture abort requested");
                            guard.token().cancel();
                            self.capture.abort().await;
                            break Err(CaptureError::Aborted);
                        }
                        Some(other) => {
                            debug!(command = ?other, "dropped: capture in flight");
                        }
                    },
                    result = &mut listen => break result,
                }
            };
            drop(listen);
            capture_timer.finish();

            let outcome = match outcome {
                Ok(_) if !guard.should_continue() => Err(CaptureError::Aborted),
                other => other,
            };

            match outcome {
                Ok(utterance) => {
                    info!(
                        utterance = %utterance.utterance,
                        confidence = utterance.confidence,
                        "utterance captured"
                    );
                    self.events
                        .emit(EngineEvent::CaptureStop(Some(utterance.clone())));

                    let parse_timer = self.metrics.span(metric_names::PARSE_DONE);
                    let parsed = self.parser.parse(&utterance.utterance);
                    parse_timer.finish();

                    match parsed {
                        Ok(intent) => {
                            info!(
                                recipients = ?intent.recipients,
                                action = %intent.action,
                                time = %intent.time,
                                "reminder_parsed"
                            );
                            self.events.emit(EngineEvent::ReminderParsed(intent));
                        }
                        Err(e) => warn!(error = %e, "utterance not understood"),
                    }
                }
                Err(CaptureError::Aborted) => {
                    info!("capture aborted");
                    self.events.emit(EngineEvent::CaptureStop(None));
                }
                Err(e) => {
                    warn!(error = %e, "capture failed");
                    self.events.emit(EngineEvent::CaptureStop(None));
                }
            }

            cycle.finish();
        }
        .instrument(span)
        .await
    }

    async fn resume(&self) {
        if self.state.current() != EngineState::WakeListening
            && self.state.transition(EngineState::WakeListening).is_err()
        {
            return;
        }
        if let Err(e) = self.start_wake_listening().await {
            error!(error = %e, "failed to resume wake listening");
        }
    }
}
