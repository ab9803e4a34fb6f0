//! Single-active-batch cancellation: at most one bulk translation is ever
//! live. Issuing a new batch cancels the previous token, so a superseded
//! stream stops committing results.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Owns the one live batch token. Each supersession cancels the current
/// token, installs a fresh one, and advances the generation counter used to
/// tag batch claims.
pub struct BatchGeneration {
    current_token: RwLock<CancellationToken>,
    generation: AtomicU64,
}

impl BatchGeneration {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Cancel the active batch (if any), advance the generation, and return
    /// the fresh token plus its generation. The newest call wins.
    pub fn supersede(&self) -> (CancellationToken, u64) {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        let fresh = CancellationToken::new();
        *token_guard = fresh.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (fresh, generation)
    }

    /// Cancel the active batch without starting a new one.
    pub fn cancel_active(&self) {
        self.current_token.read().cancel();
    }

    /// Generation of the most recently issued batch.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for BatchGeneration {
    fn default() -> Self {
        Self::new()
    }
}
