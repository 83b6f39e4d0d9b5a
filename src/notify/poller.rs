// ── Notify: Polling Strategy ───────────────────────────────────────────────
//
// Immediate fetch, then one fetch per interval. Each batch is filtered
// through the watermark: only events whose id sorts above the
// last-dispatched id go out to subscribers.
//
// The watermark comparison is lexicographic, which assumes event ids are
// zero-padded or otherwise sort in arrival order. With opaque random ids
// this silently misbehaves (skips or re-delivers); the consumer-side
// `NotificationFeed` de-dup bounds the damage. The wire contract is the
// server's.
//
// Fetch failures are logged and absorbed — delivery is best-effort, and
// the next tick covers the gap. No retry inside a tick.

use async_trait::async_trait;

use crate::atoms::error::ClientResult;
use crate::atoms::types::NotificationBatch;
use crate::client::http::ApiClient;

// ── Fetch seam ─────────────────────────────────────────────────────────────

/// Transport seam for the recent-notifications fetch, so tests can script
/// batches without a server.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn fetch_recent(&self) -> ClientResult<NotificationBatch>;
}

/// Production source: the recent-notifications endpoint.
pub struct HttpNotificationSource {
    api: ApiClient,
}

impl HttpNotificationSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl NotificationSource for HttpNotificationSource {
    async fn fetch_recent(&self) -> ClientResult<NotificationBatch> {
        self.api.get_json("/notifications/recent").await
    }
}

// ── Watermark ──────────────────────────────────────────────────────────────

/// Split a batch into the events to dispatch and the advanced watermark.
///
/// Dispatched: events with id strictly above the current watermark, in
/// batch order. Watermark: the maximum id seen in a non-empty batch, but
/// never moved backwards; an empty batch leaves it untouched.
pub fn filter_batch(
    watermark: Option<&str>,
    batch: &NotificationBatch,
) -> (Vec<usize>, Option<String>) {
    if batch.events.is_empty() {
        return (Vec::new(), watermark.map(|w| w.to_string()));
    }

    let fresh: Vec<usize> = batch
        .events
        .iter()
        .enumerate()
        .filter(|(_, event)| match watermark {
            Some(mark) => event.event_id.as_str() > mark,
            None => true,
        })
        .map(|(i, _)| i)
        .collect();

    let batch_max = batch
        .events
        .iter()
        .map(|e| e.event_id.as_str())
        .max()
        .unwrap_or_default();
    let advanced = match watermark {
        Some(mark) if mark >= batch_max => mark.to_string(),
        _ => batch_max.to_string(),
    };
    (fresh, Some(advanced))
}

// ── Tests ──────────────────────────────────────────────────────────────────
