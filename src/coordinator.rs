//! The coordinator: public facade over the cache, the in-flight registries,
//! the single-active-batch token, and the transport. Explicitly constructed
//! and injectable; owns all subsystem state privately, so tests and
//! sessions get isolated instances.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{RenderMode, TranslationCache};
use crate::cancellation::BatchGeneration;
use crate::inflight::{InFlightRegistry, TranslateHandle};
use crate::stream::consume_batch_stream;
use crate::transport::{BatchItem, TranslationTransport};
use crate::TranslateError;

pub struct TranslationCoordinator {
    cache: Arc<TranslationCache>,
    inflight: InFlightRegistry,
    generations: BatchGeneration,
    transport: Arc<dyn TranslationTransport>,
}

impl TranslationCoordinator {
    pub fn new(transport: Arc<dyn TranslationTransport>) -> Self {
        Self {
            cache: Arc::new(TranslationCache::new()),
            inflight: InFlightRegistry::new(),
            generations: BatchGeneration::new(),
            transport,
        }
    }

    /// Read access for the UI layer (and its subscription surface).
    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    // --- Single-article (full content) coordination ---

    /// Register interest in translating one article's full content.
    /// Returns a completed no-op if the active batch already claims the
    /// article; otherwise a handle shared by every concurrent caller for
    /// the same (article, mode). The actual request is performed by the
    /// caller that sees `newly_registered()`.
    pub fn translate_article(
        &self,
        article_id: &str,
        mode: RenderMode,
        signal: Option<&CancellationToken>,
    ) -> TranslateHandle {
        self.inflight
            .begin_single(article_id, mode, self.generations.generation(), signal)
    }

    pub fn mark_article_translating(&self, article_id: &str, mode: RenderMode) {
        self.inflight.mark_translating(article_id, mode);
    }

    pub fn mark_article_translated(&self, article_id: &str, mode: RenderMode) {
        self.inflight.mark_translated(article_id, mode);
    }

    pub fn is_article_translating(&self, article_id: &str) -> bool {
        self.inflight
            .is_translating(article_id, self.generations.generation())
    }

    // --- Batch coordination ---

    /// Bulk-translate titles and summaries for a list view.
    ///
    /// Articles owned by single-article requests are skipped. If nothing
    /// remains, this is a no-op and any running batch is left untouched.
    /// Otherwise the previous batch (if any) is cancelled (the newest call
    /// wins), the remainder is claimed, and the response stream is committed
    /// to the cache record by record. Claims are released on every
    /// termination path; an abort terminates silently, anything else
    /// surfaces to the caller.
    pub async fn translate_articles_batch(
        &self,
        items: Vec<BatchItem>,
        target_language: &str,
    ) -> Result<(), TranslateError> {
        if target_language.trim().is_empty() {
            return Err(TranslateError::InvalidInput(
                "target language must not be empty".into(),
            ));
        }

        let filtered: Vec<BatchItem> = items
            .into_iter()
            .filter(|item| !self.inflight.is_single_tracked(&item.id))
            .collect();
        if filtered.is_empty() {
            debug!("batch request fully covered elsewhere, nothing to do");
            return Ok(());
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let (token, generation) = self.generations.supersede();
        let ids: Vec<String> = filtered.iter().map(|item| item.id.clone()).collect();
        // Claim before the network call so concurrent callers see the
        // articles as taken.
        self.inflight.claim_for_batch(&ids, generation);
        info!(
            batch_id = %batch_id,
            generation,
            articles = ids.len(),
            target_language,
            "starting batch translation"
        );

        let result = self
            .run_batch(&filtered, target_language, &token)
            .await;
        // Claims must never leak past the batch's end, whatever happened.
        self.inflight.release_batch(&ids, generation);

        match result {
            Ok(committed) => {
                info!(batch_id = %batch_id, committed, "batch translation finished");
                Ok(())
            }
            Err(TranslateError::Cancelled) => {
                debug!(batch_id = %batch_id, "batch translation superseded or cancelled");
                Ok(())
            }
            Err(e) => {
                warn!(batch_id = %batch_id, error = %e, "batch translation failed");
                Err(e)
            }
        }
    }

    /// Abort the active batch and drop every claim. For navigation/list
    /// changes that make in-flight results irrelevant.
    pub fn cancel_all_batch_translations(&self) {
        self.generations.cancel_active();
        self.inflight.clear_batch_claims();
        info!("cancelled all batch translations");
    }

    async fn run_batch(
        &self,
        items: &[BatchItem],
        target_language: &str,
        token: &CancellationToken,
    ) -> Result<usize, TranslateError> {
        let body = tokio::select! {
            opened = self.transport.open_batch_stream(items, target_language) => opened?,
            _ = token.cancelled() => return Err(TranslateError::Cancelled),
        };
        consume_batch_stream(body, target_language, &self.cache, token).await
    }
}
