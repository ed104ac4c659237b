//! Capture cancellation: CancellationToken + generation guard.
//! Every capture cycle gets a fresh generation; aborting cancels the current
//! token so the cycle settles back to wake listening, and a result that lands
//! after the abort is recognised as stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Issues one generation + token per capture cycle.
pub struct CaptureGeneration {
    current_token: RwLock<CancellationToken>,
    generation: Arc<AtomicU64>,
}

impl CaptureGeneration {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cancel the previous cycle, advance, and hand out a guard for the new one.
    pub fn advance(&self) -> CaptureGuard {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        let token = CancellationToken::new();
        *token_guard = token.clone();
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        CaptureGuard {
            generation: Arc::clone(&self.generation),
            my_generation: gen,
            token,
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cancel the in-flight cycle without advancing the generation.
    pub fn cancel_current(&self) {
        self.current_token.read().cancel();
    }
}

impl Default for CaptureGeneration {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by one capture cycle.
#[derive(Clone)]
pub struct CaptureGuard {
    generation: Arc<AtomicU64>,
    my_generation: u64,
    token: CancellationToken,
}

impl CaptureGuard {
    #[inline]
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.my_generation
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True while the cycle was neither aborted nor superseded.
    #[inline]
    pub fn should_continue(&self) -> bool {
        !self.is_cancelled() && self.is_current()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn my_generation(&self) -> u64 {
        self.my_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_supersedes_previous() {
        let gens = CaptureGeneration::new();
        let first = gens.advance();
        assert!(first.should_continue());
        assert_eq!(first.my_generation(), 1);

        let second = gens.advance();
        assert!(first.is_cancelled());
        assert!(!first.is_current());
        assert!(second.should_continue());
        assert_eq!(gens.current_generation(), 2);
    }

    #[test]
    fn test_cancel_current() {
        let gens = CaptureGeneration::new();
        let guard = gens.advance();
        gens.cancel_current();
        assert!(guard.is_cancelled());
        assert!(guard.is_current());
        assert!(!guard.should_continue());
    }
}
