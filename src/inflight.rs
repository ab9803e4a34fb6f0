//! In-flight registries: single-article request de-duplication plus the
//! claim set of the one active batch. Both live under one lock, which is
//! what keeps "claimed by batch" and "tracked as single" mutually exclusive.
//!
//! The registry only tracks presence. The actual full-content translation
//! is performed by an external collaborator that calls
//! `mark_article_translating` / `mark_article_translated` around its own
//! request.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::RenderMode;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestKey {
    article_id: String,
    mode: RenderMode,
}

impl RequestKey {
    fn new(article_id: &str, mode: RenderMode) -> Self {
        Self {
            article_id: article_id.to_string(),
            mode,
        }
    }
}

/// Handle to a pending (or already-covered) single-article translation.
/// Concurrent callers for the same (article, mode) share one underlying
/// operation; `wait` resolves when the request is marked translated or its
/// signal aborts.
pub struct TranslateHandle {
    rx: Option<watch::Receiver<bool>>,
    newly_registered: bool,
}

impl TranslateHandle {
    /// True when the article was already claimed by the active batch and no
    /// single-article work is needed.
    pub fn is_noop(&self) -> bool {
        self.rx.is_none() && !self.newly_registered
    }

    /// True for exactly one caller per request key: the one that must
    /// perform the external request.
    pub fn newly_registered(&self) -> bool {
        self.newly_registered
    }

    /// Wait until the shared operation completes or is aborted. Aborts are
    /// silent: no error reaches waiters.
    pub async fn wait(mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        loop {
            if *rx.borrow() {
                return;
            }
            // Err means the sender was dropped (aborted or released).
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Default)]
struct RegistryState {
    single: HashMap<RequestKey, watch::Sender<bool>>,
    /// article id -> generation of the batch that claimed it.
    batch: HashMap<String, u64>,
}

/// Process-wide (per coordinator) in-flight bookkeeping.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in a single-article translation.
    ///
    /// Claimed by the live batch: returns a completed no-op (the batch
    /// already covers it). Pending request for the same key: returns a
    /// handle sharing that operation. Otherwise registers a placeholder;
    /// if `signal` aborts before completion the key is removed so a future
    /// call may retry.
    pub fn begin_single(
        &self,
        article_id: &str,
        mode: RenderMode,
        live_batch_generation: u64,
        signal: Option<&CancellationToken>,
    ) -> TranslateHandle {
        let key = RequestKey::new(article_id, mode);
        let rx = {
            let mut state = self.state.lock();
            if state.batch.get(article_id) == Some(&live_batch_generation) {
                debug!(article_id, "article claimed by active batch, skipping single request");
                return TranslateHandle {
                    rx: None,
                    newly_registered: false,
                };
            }
            if let Some(existing) = state.single.get(&key) {
                return TranslateHandle {
                    rx: Some(existing.subscribe()),
                    newly_registered: false,
                };
            }
            let (tx, rx) = watch::channel(false);
            state.single.insert(key.clone(), tx);
            rx
        };

        if let Some(token) = signal {
            let token = token.clone();
            let registry = self.clone();
            let mut done = rx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        registry.abort_single(&key);
                    }
                    _ = async {
                        loop {
                            if *done.borrow() {
                                break;
                            }
                            if done.changed().await.is_err() {
                                break;
                            }
                        }
                    } => {}
                }
            });
        }

        TranslateHandle {
            rx: Some(rx),
            newly_registered: true,
        }
    }

    /// Hook invoked by the external collaborator before it issues its own
    /// full-content request. Idempotent.
    pub fn mark_translating(&self, article_id: &str, mode: RenderMode) {
        let mut state = self.state.lock();
        state
            .single
            .entry(RequestKey::new(article_id, mode))
            .or_insert_with(|| watch::channel(false).0);
    }

    /// Hook invoked by the external collaborator once its request resolved.
    /// Completes every shared handle and releases the key.
    pub fn mark_translated(&self, article_id: &str, mode: RenderMode) {
        let removed = {
            let mut state = self.state.lock();
            state.single.remove(&RequestKey::new(article_id, mode))
        };
        if let Some(tx) = removed {
            let _ = tx.send(true);
        }
    }

    /// True if the article is tracked under either mode or claimed by the
    /// live batch.
    pub fn is_translating(&self, article_id: &str, live_batch_generation: u64) -> bool {
        let state = self.state.lock();
        state
            .single
            .contains_key(&RequestKey::new(article_id, RenderMode::Plain))
            || state
                .single
                .contains_key(&RequestKey::new(article_id, RenderMode::Readability))
            || state.batch.get(article_id) == Some(&live_batch_generation)
    }

    /// True if the article is tracked by the single-request map in any mode.
    pub fn is_single_tracked(&self, article_id: &str) -> bool {
        let state = self.state.lock();
        state
            .single
            .contains_key(&RequestKey::new(article_id, RenderMode::Plain))
            || state
                .single
                .contains_key(&RequestKey::new(article_id, RenderMode::Readability))
    }

    /// Claim articles for a batch. A stale claim from a superseded batch is
    /// overwritten: ownership transfers to the newest batch.
    pub fn claim_for_batch(&self, article_ids: &[String], generation: u64) {
        let mut state = self.state.lock();
        for id in article_ids {
            state.batch.insert(id.clone(), generation);
        }
    }

    /// Release a batch's claims. Only claims still owned by `generation`
    /// are removed, so a superseded batch cannot drop its successor's.
    pub fn release_batch(&self, article_ids: &[String], generation: u64) {
        let mut state = self.state.lock();
        for id in article_ids {
            if state.batch.get(id) == Some(&generation) {
                state.batch.remove(id);
            }
        }
    }

    /// Force-clear every batch claim (lifecycle escape hatch).
    pub fn clear_batch_claims(&self) {
        self.state.lock().batch.clear();
    }

    fn abort_single(&self, key: &RequestKey) {
        let removed = {
            let mut state = self.state.lock();
            state.single.remove(key)
        };
        if removed.is_some() {
            debug!(article_id = %key.article_id, mode = %key.mode, "single request aborted, key released");
        }
        // Dropping the sender wakes waiters without surfacing an error.
    }
}
