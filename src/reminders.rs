//! Reminder desk: the consumer of parsed intents.
//! Persists every `reminder-parsed` event and speaks a confirmation.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::capture::Utterance;
use crate::events::{EngineEvent, Subscription};
use crate::intent::ReminderIntent;
use crate::speech::SpeechOutput;
use crate::store::{now_unix, ReminderRecord, ReminderStore};

pub struct ReminderDesk {
    store: Arc<ReminderStore>,
    speech: Arc<dyn SpeechOutput>,
    locale: String,
    /// Transcript of the latest capture, paired with the intent parsed from it.
    last_utterance: Option<Utterance>,
}

impl ReminderDesk {
    pub fn new(store: Arc<ReminderStore>, speech: Arc<dyn SpeechOutput>, locale: &str) -> Self {
        Self {
            store,
            speech,
            locale: locale.to_string(),
            last_utterance: None,
        }
    }

    /// Consume events until the subscription closes.
    pub fn spawn(mut self, mut events: Subscription) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event);
            }
            debug!("reminder desk stopped");
        })
    }

    fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::CaptureStart => self.last_utterance = None,
            EngineEvent::CaptureStop(utterance) => self.last_utterance = utterance,
            EngineEvent::ReminderParsed(intent) => self.accept(intent),
            _ => {}
        }
    }

    fn accept(&mut self, intent: ReminderIntent) {
        let heard = self.last_utterance.take();
        let record = ReminderRecord {
            request_id: uuid::Uuid::new_v4().to_string(),
            locale: self.locale.clone(),
            utterance: heard.as_ref().map(|u| u.utterance.clone()),
            confidence: heard.as_ref().map(|u| f64::from(u.confidence)),
            recipients: intent.recipients.clone(),
            action: intent.action.clone(),
            time: intent.time.clone(),
            created_at: now_unix(),
        };
        info!(request_id = %record.request_id, "reminder stored");
        self.store.record(record);
        self.speech.speak(&confirmation(&self.locale, &intent));
    }
}

/// Spoken confirmation, e.g. "Reminder set for you: pick up laundry, 5pm today."
pub fn confirmation(locale: &str, intent: &ReminderIntent) -> String {
    let french = locale.to_lowercase().starts_with("fr");
    let (self_ref, you, conjunction) = if french {
        ("moi", "vous", "et")
    } else {
        ("me", "you", "and")
    };

    let names: Vec<&str> = intent
        .recipients
        .iter()
        .map(|r| if r.eq_ignore_ascii_case(self_ref) { you } else { r.as_str() })
        .collect();
    let who = match names.split_last() {
        None => you.to_string(),
        Some((last, [])) => (*last).to_string(),
        Some((last, rest)) => format!("{} {conjunction} {last}", rest.join(", ")),
    };

    if french {
        format!("Rappel enregistré pour {who} : {}, {}.", intent.action, intent.time)
    } else {
        format!("Reminder set for {who}: {}, {}.", intent.action, intent.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSpeech {
        spoken: Mutex<Vec<String>>,
    }

    impl SpeechOutput for RecordingSpeech {
        fn speak(&self, text: &str) {
            self.spoken.lock().push(text.to_string());
        }
    }

    fn intent(recipients: &[&str], action: &str, time: &str) -> ReminderIntent {
        ReminderIntent {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            action: action.into(),
            time: time.into(),
        }
    }

    #[test]
    fn test_english_confirmation() {
        assert_eq!(
            confirmation("en", &intent(&["me"], "pick up laundry", "5pm today")),
            "Reminder set for you: pick up laundry, 5pm today."
        );
        assert_eq!(
            confirmation("en-GB", &intent(&["Alice", "Bob", "Carol"], "attend the meeting", "noon")),
            "Reminder set for Alice, Bob and Carol: attend the meeting, noon."
        );
    }

    #[test]
    fn test_french_confirmation() {
        assert_eq!(
            confirmation("fr", &intent(&["moi"], "sortir le chien", "18h")),
            "Rappel enregistré pour vous : sortir le chien, 18h."
        );
        assert_eq!(
            confirmation("fr", &intent(&["Alice", "Bob"], "réserver la salle", "midi")),
            "Rappel enregistré pour Alice et Bob : réserver la salle, midi."
        );
    }

    #[tokio::test]
    async fn test_parsed_intent_is_stored_and_confirmed() {
        let path = std::env::temp_dir().join(format!("desk-{}.db", uuid::Uuid::new_v4()));
        let store = ReminderStore::open(&path).unwrap();
        let speech = Arc::new(RecordingSpeech::default());
        let mut desk = ReminderDesk::new(Arc::clone(&store), speech.clone(), "en");

        desk.handle(EngineEvent::CaptureStart);
        desk.handle(EngineEvent::CaptureStop(Some(Utterance {
            utterance: "Remind me to pick up laundry at 5pm today.".into(),
            confidence: 0.5,
        })));
        desk.handle(EngineEvent::ReminderParsed(intent(&["me"], "pick up laundry", "5pm today")));
        desk.handle(EngineEvent::WakeListenStart);

        assert_eq!(
            *speech.spoken.lock(),
            ["Reminder set for you: pick up laundry, 5pm today."]
        );

        let mut rows = Vec::new();
        for _ in 0..50 {
            rows = store.query_recent(5).unwrap();
            if !rows.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].utterance.as_deref(),
            Some("Remind me to pick up laundry at 5pm today.")
        );
        assert_eq!(rows[0].confidence, Some(0.5));
        assert_eq!(rows[0].recipients, ["me"]);

        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_queued_reminder_persists_when_events_close() {
        let path = std::env::temp_dir().join(format!("desk-{}.db", uuid::Uuid::new_v4()));
        let store = ReminderStore::open(&path).unwrap();
        let speech = Arc::new(RecordingSpeech::default());
        let bus = crate::events::EventBus::new();
        let events = bus.subscribe();
        let id = events.id();

        // Emitted before the desk gets a chance to run, then the queue closes.
        bus.emit(EngineEvent::CaptureStop(Some(Utterance {
            utterance: "Remind me to stretch at noon.".into(),
            confidence: 0.75,
        })));
        bus.emit(EngineEvent::ReminderParsed(intent(&["me"], "stretch", "noon")));
        let desk = ReminderDesk::new(Arc::clone(&store), speech.clone(), "en").spawn(events);
        assert!(bus.unsubscribe(id));

        tokio::time::timeout(Duration::from_secs(1), desk)
            .await
            .expect("desk drains and stops once unsubscribed")
            .unwrap();
        store.close().await;

        assert_eq!(*speech.spoken.lock(), ["Reminder set for you: stretch, noon."]);
        let rows = store.query_recent(5).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "stretch");
        assert_eq!(rows[0].utterance.as_deref(), Some("Remind me to stretch at noon."));

        drop(store);
        let _ = std::fs::remove_file(&path);
    }
}
