//! In-memory translation cache keyed by (article, language, render mode).
//! Writes merge per field; entries never expire on their own and are only
//! removed by explicit clear/disable calls. A single lock covers both the
//! entries and the disabled set so disabling purges atomically.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Rendering mode for article content. Extracted ("readability") content
/// differs from the raw content, so the two occupy independent cache slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    Plain,
    Readability,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Plain => write!(f, "plain"),
            RenderMode::Readability => write!(f, "readability"),
        }
    }
}

/// Cache key: target language plus render mode.
/// Formats as `"fr"` for plain content and `"fr:readability"` for extracted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    language: String,
    mode: RenderMode,
}

impl CacheKey {
    pub fn new(language: &str, mode: RenderMode) -> Self {
        Self {
            language: language.to_string(),
            mode,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode {
            RenderMode::Plain => write!(f, "{}", self.language),
            RenderMode::Readability => write!(f, "{}:readability", self.language),
        }
    }
}

/// Best-known translated fields for one (article, cache key).
/// Every field is independently nullable; a partial write leaves the other
/// fields untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleTranslation {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
}

impl ArticleTranslation {
    /// Merge `patch` into `self`: present fields overwrite, absent fields
    /// are preserved (most-recent-write-wins per field).
    fn merge(&mut self, patch: ArticleTranslation) {
        if patch.title.is_some() {
            self.title = patch.title;
        }
        if patch.summary.is_some() {
            self.summary = patch.summary;
        }
        if patch.content.is_some() {
            self.content = patch.content;
        }
    }
}

/// What changed about an article's cached translations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheChange {
    Updated,
    Cleared,
    Disabled,
    Enabled,
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub article_id: String,
    pub change: CacheChange,
}

struct CacheState {
    entries: HashMap<String, HashMap<CacheKey, ArticleTranslation>>,
    disabled: HashSet<String>,
}

/// Reactive keyed store of partial translation fragments.
/// Mutations are pure data-structure updates plus a change notification;
/// no network calls originate here.
pub struct TranslationCache {
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
}

impl TranslationCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                disabled: HashSet::new(),
            }),
            events,
        }
    }

    /// Subscribe to change notifications. Receivers that fall behind lose
    /// the oldest events (broadcast semantics); consumers re-read the cache.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Current merged record, or `None` if absent or the article is
    /// disabled. Callers treat `None` as "fall back to the original text".
    pub fn get_translation(
        &self,
        article_id: &str,
        language: &str,
        mode: RenderMode,
    ) -> Option<ArticleTranslation> {
        let state = self.state.lock();
        if state.disabled.contains(article_id) {
            return None;
        }
        state
            .entries
            .get(article_id)?
            .get(&CacheKey::new(language, mode))
            .cloned()
    }

    /// Merge-write `patch` for the article; creates the entry if absent.
    /// Writes to a disabled article are dropped so a late stream record can
    /// never repopulate it.
    pub fn set_translation(
        &self,
        article_id: &str,
        language: &str,
        patch: ArticleTranslation,
        mode: RenderMode,
    ) {
        {
            let mut state = self.state.lock();
            if state.disabled.contains(article_id) {
                debug!(article_id, "dropping write for disabled article");
                return;
            }
            state
                .entries
                .entry(article_id.to_string())
                .or_default()
                .entry(CacheKey::new(language, mode))
                .or_default()
                .merge(patch);
        }
        self.notify(article_id, CacheChange::Updated);
    }

    /// Remove all cached translations for the article, in every language
    /// and mode. Independent of the disabled flag.
    pub fn clear_translation(&self, article_id: &str) {
        let removed = {
            let mut state = self.state.lock();
            state.entries.remove(article_id).is_some()
        };
        if removed {
            self.notify(article_id, CacheChange::Cleared);
        }
    }

    /// Opt the article out of translation. Purges any cached data in the
    /// same atomic step: observers never see "disabled but still populated".
    pub fn disable_translation(&self, article_id: &str) {
        {
            let mut state = self.state.lock();
            state.disabled.insert(article_id.to_string());
            state.entries.remove(article_id);
        }
        self.notify(article_id, CacheChange::Disabled);
    }

    /// Clear the opt-out flag. Does not repopulate data; the next read
    /// returns `None` until a new write arrives.
    pub fn enable_translation(&self, article_id: &str) {
        let was_disabled = {
            let mut state = self.state.lock();
            state.disabled.remove(article_id)
        };
        if was_disabled {
            self.notify(article_id, CacheChange::Enabled);
        }
    }

    pub fn is_disabled(&self, article_id: &str) -> bool {
        self.state.lock().disabled.contains(article_id)
    }

    fn notify(&self, article_id: &str, change: CacheChange) {
        // No subscribers is fine.
        let _ = self.events.send(CacheEvent {
            article_id: article_id.to_string(),
            change,
        });
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(
        title: Option<&str>,
        summary: Option<&str>,
        content: Option<&str>,
    ) -> ArticleTranslation {
        ArticleTranslation {
            title: title.map(str::to_string),
            summary: summary.map(str::to_string),
            content: content.map(str::to_string),
        }
    }

    #[test]
    fn merge_preserves_absent_fields() {
        let cache = TranslationCache::new();
        cache.set_translation("a1", "fr", patch(Some("A"), None, None), RenderMode::Plain);
        cache.set_translation("a1", "fr", patch(None, None, Some("B")), RenderMode::Plain);

        let got = cache.get_translation("a1", "fr", RenderMode::Plain).unwrap();
        assert_eq!(got, patch(Some("A"), None, Some("B")));
    }

    #[test]
    fn set_is_idempotent() {
        let cache = TranslationCache::new();
        let write = patch(Some("T"), Some("S"), None);
        cache.set_translation("a1", "fr", write.clone(), RenderMode::Plain);
        let once = cache.get_translation("a1", "fr", RenderMode::Plain);
        cache.set_translation("a1", "fr", write, RenderMode::Plain);
        let twice = cache.get_translation("a1", "fr", RenderMode::Plain);
        assert_eq!(once, twice);
    }

    #[test]
    fn render_modes_are_independent_slots() {
        let cache = TranslationCache::new();
        cache.set_translation("a1", "fr", patch(None, None, Some("raw")), RenderMode::Plain);
        cache.set_translation(
            "a1",
            "fr",
            patch(None, None, Some("extracted")),
            RenderMode::Readability,
        );

        let plain = cache.get_translation("a1", "fr", RenderMode::Plain).unwrap();
        let reader = cache
            .get_translation("a1", "fr", RenderMode::Readability)
            .unwrap();
        assert_eq!(plain.content.as_deref(), Some("raw"));
        assert_eq!(reader.content.as_deref(), Some("extracted"));
    }

    #[test]
    fn disable_purges_and_blocks_reads() {
        let cache = TranslationCache::new();
        cache.set_translation("a1", "fr", patch(Some("T"), None, None), RenderMode::Plain);
        cache.disable_translation("a1");

        assert!(cache.is_disabled("a1"));
        assert!(cache.get_translation("a1", "fr", RenderMode::Plain).is_none());
        assert!(cache
            .get_translation("a1", "fr", RenderMode::Readability)
            .is_none());
    }

    #[test]
    fn reenable_does_not_resurrect() {
        let cache = TranslationCache::new();
        cache.set_translation("a1", "fr", patch(Some("T"), None, None), RenderMode::Plain);
        cache.disable_translation("a1");
        cache.enable_translation("a1");

        assert!(!cache.is_disabled("a1"));
        assert!(cache.get_translation("a1", "fr", RenderMode::Plain).is_none());

        cache.set_translation("a1", "fr", patch(Some("T2"), None, None), RenderMode::Plain);
        let got = cache.get_translation("a1", "fr", RenderMode::Plain).unwrap();
        assert_eq!(got.title.as_deref(), Some("T2"));
    }

    #[test]
    fn writes_while_disabled_are_dropped() {
        let cache = TranslationCache::new();
        cache.disable_translation("a1");
        cache.set_translation("a1", "fr", patch(Some("T"), None, None), RenderMode::Plain);
        cache.enable_translation("a1");
        assert!(cache.get_translation("a1", "fr", RenderMode::Plain).is_none());
    }

    #[test]
    fn clear_removes_all_keys() {
        let cache = TranslationCache::new();
        cache.set_translation("a1", "fr", patch(Some("T"), None, None), RenderMode::Plain);
        cache.set_translation("a1", "de", patch(Some("T"), None, None), RenderMode::Readability);
        cache.clear_translation("a1");
        assert!(cache.get_translation("a1", "fr", RenderMode::Plain).is_none());
        assert!(cache
            .get_translation("a1", "de", RenderMode::Readability)
            .is_none());
        assert!(!cache.is_disabled("a1"));
    }

    #[test]
    fn mutations_notify_subscribers() {
        let cache = TranslationCache::new();
        let mut rx = cache.subscribe();

        cache.set_translation("a1", "fr", patch(Some("T"), None, None), RenderMode::Plain);
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.article_id, "a1");
        assert_eq!(ev.change, CacheChange::Updated);

        cache.disable_translation("a1");
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.change, CacheChange::Disabled);
    }
}
