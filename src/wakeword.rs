//! Wakeword capability: a model, a listener that can be started and stopped,
//! and a single callback fired each time the wake phrase is spotted.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::{self, AudioConfig, ListenerHandle};

/// Invoked with no arguments when the wake phrase is detected.
pub type KeywordCallback = Arc<dyn Fn() + Send + Sync>;

/// Detection thresholds for the energy spotter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeModel {
    pub name: String,
    /// Stage 1 trigger score.
    pub th_low: f32,
    /// Stage 2 per-frame confirmation score.
    pub th_high: f32,
    pub confirm_window_ms: u64,
    pub confirm_frames_needed: u32,
    pub spike_ratio: f32,
    /// Raw i16 RMS below which a frame is silence.
    pub silence_threshold: f32,
    /// No re-trigger for this long after a confirmed wake.
    pub refractory_ms: u64,
}

impl Default for WakeModel {
    fn default() -> Self {
        Self {
            name: "energy-default".into(),
            th_low: 0.02,
            th_high: 0.04,
            confirm_window_ms: 150,
            confirm_frames_needed: 2,
            spike_ratio: 3.0,
            silence_threshold: 300.0,
            refractory_ms: 2000,
        }
    }
}

impl WakeModel {
    pub fn validate(&self) -> Result<(), WakewordError> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.th_low) || !in_unit(self.th_high) {
            return Err(WakewordError::InvalidModel(
                "thresholds must be within 0.0..=1.0".into(),
            ));
        }
        if self.th_low > self.th_high {
            return Err(WakewordError::InvalidModel(format!(
                "th_low {} exceeds th_high {}",
                self.th_low, self.th_high
            )));
        }
        if self.confirm_frames_needed == 0 {
            return Err(WakewordError::InvalidModel(
                "confirm_frames_needed must be at least 1".into(),
            ));
        }
        if self.spike_ratio <= 1.0 {
            return Err(WakewordError::InvalidModel(
                "spike_ratio must be greater than 1.0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum WakewordError {
    #[error("cannot load a model while listening")]
    ModelLoadWhileListening,
    #[error("no wakeword model loaded")]
    NoModel,
    #[error("invalid wakeword model: {0}")]
    InvalidModel(String),
    #[error("audio device error: {0}")]
    Device(String),
    #[error("listener thread error: {0}")]
    Thread(String),
}

/// Platform adapter for continuous wake phrase monitoring.
pub trait WakewordCapability: Send + Sync {
    /// Fails with `ModelLoadWhileListening` while the listener runs.
    fn load_model(&self, model: WakeModel) -> Result<(), WakewordError>;

    fn start_listening(&self) -> BoxFuture<'_, Result<(), WakewordError>>;

    fn stop_listening(&self) -> BoxFuture<'_, Result<(), WakewordError>>;

    /// Replaces any previously registered callback.
    fn on_keyword_spotted(&self, callback: KeywordCallback);
}

/// Microphone wakeword built on the energy spotter in [`crate::audio`].
pub struct EnergyWakeword {
    audio: AudioConfig,
    model: RwLock<Option<WakeModel>>,
    callback: Arc<RwLock<Option<KeywordCallback>>>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl EnergyWakeword {
    pub fn new(audio: AudioConfig) -> Self {
        Self {
            audio,
            model: RwLock::new(None),
            callback: Arc::new(RwLock::new(None)),
            listener: Mutex::new(None),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener.lock().is_some()
    }

    async fn stop_running(&self) -> Result<bool, WakewordError> {
        let running = self.listener.lock().take();
        match running {
            Some(handle) => {
                tokio::task::spawn_blocking(move || handle.stop())
                    .await
                    .map_err(|e| WakewordError::Thread(format!("stop join failed: {e}")))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl WakewordCapability for EnergyWakeword {
    fn load_model(&self, model: WakeModel) -> Result<(), WakewordError> {
        if self.is_listening() {
            return Err(WakewordError::ModelLoadWhileListening);
        }
        model.validate()?;
        info!(model = %model.name, "wakeword model loaded");
        *self.model.write() = Some(model);
        Ok(())
    }

    fn start_listening(&self) -> BoxFuture<'_, Result<(), WakewordError>> {
        Box::pin(async move {
            let model = self.model.read().clone().ok_or(WakewordError::NoModel)?;
            if self.stop_running().await? {
                debug!("wakeword listener restarting");
            }

            let audio = self.audio.clone();
            let callback = Arc::clone(&self.callback);
            let handle =
                tokio::task::spawn_blocking(move || audio::spawn_listener(audio, model, callback))
                    .await
                    .map_err(|e| WakewordError::Thread(format!("start join failed: {e}")))??;

            *self.listener.lock() = Some(handle);
            Ok(())
        })
    }

    fn stop_listening(&self) -> BoxFuture<'_, Result<(), WakewordError>> {
        Box::pin(async move {
            if !self.stop_running().await? {
                debug!("wakeword listener was not running");
            }
            Ok(())
        })
    }

    fn on_keyword_spotted(&self, callback: KeywordCallback) {
        *self.callback.write() = Some(callback);
    }
}
