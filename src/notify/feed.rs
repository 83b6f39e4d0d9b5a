// ── Notify: Consumer Feed ──────────────────────────────────────────────────
//
// The subscriber-side buffer behind a notification badge: retains the 100
// most recent events by arrival order (oldest evicted first) and drops
// anything whose id is already retained. De-duplication lives here — not
// in the delivery service — because the two delivery strategies make no
// cross-strategy ordering promise.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::atoms::constants::NOTIFICATION_BUFFER_CAP;
use crate::atoms::types::NotificationEvent;
use crate::notify::service::{ListenerId, NotificationService};

#[derive(Clone, Default)]
pub struct NotificationFeed {
    buffer: Arc<Mutex<VecDeque<NotificationEvent>>>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this feed to every event the service delivers. Returns
    /// the listener id so the embedder can detach the feed later.
    pub fn attach(&self, service: &NotificationService) -> ListenerId {
        let feed = self.clone();
        service.subscribe_all(move |event| {
            feed.push(event.clone());
        })
    }

    /// Insert one event. Returns false when the id is already retained
    /// (the event is dropped without touching the buffer).
    pub fn push(&self, event: NotificationEvent) -> bool {
        let mut buffer = self.buffer.lock();
        if buffer.iter().any(|e| e.event_id == event.event_id) {
            return false;
        }
        if buffer.len() == NOTIFICATION_BUFFER_CAP {
            buffer.pop_front();
        }
        buffer.push_back(event);
        true
    }

    /// Retained events in arrival order, oldest first.
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.buffer.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Drop everything (badge cleared).
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
