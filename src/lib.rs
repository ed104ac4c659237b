//! Vocal reminders: voice wake + reminder intent parsing assistant.
//! Main library: module layout and process wiring.

pub mod audio;
pub mod cancellation;
pub mod capture;
pub mod config;
pub mod engine;
pub mod events;
pub mod intent;
pub mod metrics;
pub mod reminders;
pub mod speech;
pub mod state_machine;
pub mod store;
pub mod wakeword;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use capture::ConsoleCapture;
use config::{Config, ConfigError};
use engine::{InitializationError, ModelSource, VoiceIntentEngine};
use intent::compiler::PatternCompilationError;
use intent::locale::{LocaleTable, LocaleTableError};
use intent::IntentParser;
use reminders::ReminderDesk;
use speech::{LogSpeech, SpeechOutput};
use store::{ReminderStore, StoreError};
use wakeword::EnergyWakeword;

/// Set to any value for JSON log lines.
pub const LOG_JSON_ENV: &str = "VOCAL_REMINDERS_LOG_JSON";

const IDLE_REFRESH: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    LocaleTable(#[from] LocaleTableError),
    #[error(transparent)]
    Patterns(#[from] PatternCompilationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Initialization(#[from] InitializationError),
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vocal_reminders=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    if std::env::var_os(LOG_JSON_ENV).is_some() {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wire the engine to the microphone, the console and the reminder store,
/// then run until Ctrl-C.
pub async fn run() -> Result<(), RunError> {
    init_tracing();
    info!("vocal-reminders starting");

    let config = Config::from_env()?;

    let table = match &config.locale_table {
        Some(path) => LocaleTable::load_from_file(path)?,
        None => LocaleTable::builtin(),
    };
    let parser = IntentParser::new(&table, &config.locale)?;
    let locale = parser.locale().to_string();

    let store = ReminderStore::open(&config.database)?;
    if let Err(e) = store.cleanup_older_than_days(config.history_retention_days) {
        warn!(error = %e, "reminder cleanup failed");
    }

    let speech: Arc<dyn SpeechOutput> = Arc::new(LogSpeech);
    let engine = VoiceIntentEngine::new(
        Arc::new(EnergyWakeword::new(config.audio.clone())),
        Arc::new(ConsoleCapture::stdin()),
        parser,
        ModelSource::File(config.wakeword_model.clone()),
    );

    let events = engine.subscribe();
    let desk_subscription = events.id();
    let desk = ReminderDesk::new(Arc::clone(&store), speech, &locale).spawn(events);

    engine.start().await?;
    info!(locale = %locale, "listening for the wake phrase");

    // Refresh the reminder list only while no capture is in flight.
    let mut refresh = tokio::time::interval(IDLE_REFRESH);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "ctrl-c handler failed");
                }
                break;
            }
            _ = refresh.tick() => {
                if !engine.idle() {
                    continue;
                }
                match store.query_recent(5) {
                    Ok(recent) => debug!(count = recent.len(), "reminders refreshed"),
                    Err(e) => warn!(error = %e, "reminder refresh failed"),
                }
            }
        }
    }

    info!("vocal-reminders shutting down");
    engine.shutdown().await;
    // Closing the desk's queue lets it persist what was already emitted.
    engine.unsubscribe(desk_subscription);
    if let Err(e) = desk.await {
        warn!(error = %e, "reminder desk task failed");
    }
    store.close().await;
    engine.metrics().log_summary();
    Ok(())
}
