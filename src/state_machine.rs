//! Engine state: WakeListening ⇄ Capturing.
//! Exactly one state is active; `idle` is true only while listening for the wake phrase.

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// All states of the voice intent engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineState {
    WakeListening,
    Capturing,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::WakeListening => write!(f, "WakeListening"),
            EngineState::Capturing => write!(f, "Capturing"),
        }
    }
}

impl EngineState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: EngineState) -> bool {
        matches!(
            (self, next),
            (EngineState::WakeListening, EngineState::Capturing)
                | (EngineState::Capturing, EngineState::WakeListening)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: EngineState,
    pub to: EngineState,
}

/// Thread-safe state holder with a watch channel for observers.
pub struct StateMachine {
    state: RwLock<EngineState>,
    state_tx: watch::Sender<EngineState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(EngineState::WakeListening);
        Self {
            state: RwLock::new(EngineState::WakeListening),
            state_tx,
        }
    }

    /// Current state (non-blocking read).
    pub fn current(&self) -> EngineState {
        *self.state.read()
    }

    /// True exactly when no capture is in flight.
    pub fn idle(&self) -> bool {
        self.current() == EngineState::WakeListening
    }

    /// Attempt a state transition. Returns the new state or why it was refused.
    pub fn transition(&self, next: EngineState) -> Result<EngineState, TransitionError> {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next) {
            let err = TransitionError {
                from: current,
                to: next,
            };
            warn!(error = %err, "state_transition_rejected");
            return Err(err);
        }
        *state = next;
        self.state_tx.send_replace(next);
        info!(from = %current, to = %next, "state_transition");
        Ok(next)
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), EngineState::WakeListening);
        assert!(sm.idle());
    }

    #[test]
    fn test_round_trip_transitions() {
        let sm = StateMachine::new();
        assert_eq!(sm.transition(EngineState::Capturing), Ok(EngineState::Capturing));
        assert!(!sm.idle());
        assert_eq!(
            sm.transition(EngineState::WakeListening),
            Ok(EngineState::WakeListening)
        );
        assert!(sm.idle());
    }

    #[test]
    fn test_self_transition_rejected() {
        let sm = StateMachine::new();
        let err = sm.transition(EngineState::WakeListening).unwrap_err();
        assert_eq!(err.from, EngineState::WakeListening);

        sm.transition(EngineState::Capturing).unwrap();
        assert!(sm.transition(EngineState::Capturing).is_err());
        assert_eq!(sm.current(), EngineState::Capturing);
    }

    #[test]
    fn test_watchers_see_changes() {
        let sm = StateMachine::new();
        let rx = sm.subscribe();
        sm.transition(EngineState::Capturing).unwrap();
        assert_eq!(*rx.borrow(), EngineState::Capturing);
    }
}
