//! Babelfeed: translation coordination and caching for a feed reader
//! client. Coordinates AI-driven translation of article titles/summaries
//! (bulk, streaming) and full article content (single-item), de-duplicates
//! overlapping work, supersedes stale in-flight batches, and maintains a
//! partial-result cache consumed reactively by the UI.
//!
//! The transport and the translation backend are external collaborators;
//! this crate owns the merge-cache, the in-flight registries, the
//! single-active-batch supersession logic, and the incremental
//! line-delimited-JSON stream decoder that feeds the cache.

pub mod cache;
pub mod cancellation;
pub mod coordinator;
pub mod inflight;
pub mod stream;
pub mod transport;

pub use cache::{ArticleTranslation, CacheChange, CacheEvent, CacheKey, RenderMode, TranslationCache};
pub use coordinator::TranslationCoordinator;
pub use inflight::TranslateHandle;
pub use transport::{BatchItem, HttpTransport, TranslationTransport};

/// Failures surfaced by the subsystem. `Cancelled` marks a deliberate
/// abort (superseded batch, navigation away) and is swallowed by the batch
/// coordinator rather than surfaced; everything else bubbles up to the
/// caller, which owns retry policy.
#[derive(Debug)]
pub enum TranslateError {
    ApiError(String),
    Cancelled,
    InvalidInput(String),
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::ApiError(msg) => write!(f, "API error: {msg}"),
            TranslateError::Cancelled => write!(f, "translation cancelled"),
            TranslateError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for TranslateError {}
