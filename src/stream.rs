//! Streaming result consumer: decodes a newline-delimited JSON response
//! body incrementally and commits each record to the cache in arrival
//! order. A byte carry-over buffer holds the trailing partial line between
//! chunks, so chunk boundaries (including mid-record and mid-UTF-8 splits)
//! never change the committed sequence.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{ArticleTranslation, RenderMode, TranslationCache};
use crate::TranslateError;

/// One wire record: `{"id": ..., "title": ..., "summary": ...}`.
/// Fields other than `id` are optional so a sparse record cannot null out
/// an earlier write (most-recent-write-wins per field).
#[derive(Debug, Deserialize)]
struct BatchRecord {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// Consume a batch response stream, committing records as they arrive.
/// Returns the number of committed records.
///
/// A line that fails to parse is dropped; the stream continues. A cancelled
/// token stops further reads and commits and surfaces as `Cancelled` for
/// the coordinator to classify. Transport errors propagate as-is.
pub async fn consume_batch_stream<S>(
    mut body: S,
    language: &str,
    cache: &TranslationCache,
    token: &CancellationToken,
) -> Result<usize, TranslateError>
where
    S: Stream<Item = Result<Bytes, TranslateError>> + Unpin,
{
    let mut carry: Vec<u8> = Vec::new();
    let mut committed = 0usize;

    loop {
        let chunk = tokio::select! {
            next = body.next() => match next {
                Some(chunk) => chunk?,
                None => break,
            },
            _ = token.cancelled() => return Err(TranslateError::Cancelled),
        };
        carry.extend_from_slice(&chunk);

        // Process every complete line; keep the trailing partial one.
        while let Some(pos) = carry.iter().position(|&b| b == b'\n') {
            if token.is_cancelled() {
                return Err(TranslateError::Cancelled);
            }
            let line: Vec<u8> = carry.drain(..=pos).collect();
            commit_line(&line[..line.len() - 1], language, cache, &mut committed);
        }
    }

    if token.is_cancelled() {
        return Err(TranslateError::Cancelled);
    }
    // A final record without a trailing newline still counts.
    if !carry.is_empty() {
        commit_line(&carry, language, cache, &mut committed);
    }

    Ok(committed)
}

fn commit_line(line: &[u8], language: &str, cache: &TranslationCache, committed: &mut usize) {
    if line.iter().all(u8::is_ascii_whitespace) {
        return;
    }
    match serde_json::from_slice::<BatchRecord>(line) {
        Ok(record) => {
            cache.set_translation(
                &record.id,
                language,
                ArticleTranslation {
                    title: record.title,
                    summary: record.summary,
                    content: None,
                },
                RenderMode::Plain,
            );
            *committed += 1;
        }
        Err(e) => {
            debug!(error = %e, len = line.len(), "dropping malformed record line");
        }
    }
}
