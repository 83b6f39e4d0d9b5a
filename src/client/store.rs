// ── Client: Message Reconciliation Store ───────────────────────────────────
//
// Holds the ordered message list for the active conversation and runs the
// optimistic-send lifecycle:
//
//   Idle → Optimistic → Streaming → Reconciled      (success)
//   Optimistic | Streaming → Failed                 (rollback)
//
// Each outstanding send is an explicit `PendingSend` record — a
// correlation id, a state tag, and the placeholder ids it owns. Every
// mutation matches messages by exact id, never by list position, so the
// store stays correct if rendering ever reorders.
//
// Discipline: at most one send may be outstanding at a time. The store
// does not enforce it (the caller disables its input surface); it logs a
// warning when violated, because overlapping sends would make id matching
// ambiguous during reconciliation.

use chrono::Utc;
use log::warn;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use uuid::Uuid;

use crate::atoms::types::{ChatMessage, MessageId, Role};
use crate::client::stream::reduce::StreamOutcome;

// ── Placeholder id generation ──────────────────────────────────────────────

/// Client-generated message ids: epoch milliseconds, bumped past the last
/// issued value so two sends within the same millisecond stay distinct.
#[derive(Debug, Default)]
pub struct PlaceholderIds {
    last: Mutex<MessageId>,
}

impl PlaceholderIds {
    pub fn next(&self) -> MessageId {
        let mut last = self.last.lock();
        let now = Utc::now().timestamp_millis();
        *last = if now > *last { now } else { *last + 1 };
        *last
    }
}

// ── Pending send record ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Both messages appended, no content received yet.
    Optimistic,
    /// At least one content delta applied to the assistant placeholder.
    Streaming,
    /// Server ids adopted; the record is finished.
    Reconciled,
    /// Rolled back; the record's messages are gone.
    Failed,
}

/// One outstanding send and the messages it owns.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub correlation_id: Uuid,
    pub state: SendState,
    pub user_placeholder: MessageId,
    pub assistant_placeholder: MessageId,
}

// ── Store ──────────────────────────────────────────────────────────────────

struct StoreInner {
    messages: Vec<ChatMessage>,
    conversation_id: Option<String>,
    active_send: Option<Uuid>,
}

/// Message list + optimistic send state machine. Clone is cheap (Arc
/// internals); all clones see the same list.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<RwLock<StoreInner>>,
    ids: Arc<PlaceholderIds>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                messages: Vec::new(),
                conversation_id: None,
                active_send: None,
            })),
            ids: Arc::new(PlaceholderIds::default()),
        }
    }

    // ── Read side (rendering) ──────────────────────────────────────────

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.read().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().messages.is_empty()
    }

    pub fn current_conversation(&self) -> Option<String> {
        self.inner.read().conversation_id.clone()
    }

    // ── Conversation switching ─────────────────────────────────────────

    /// Replace the whole list, e.g. with fetched history for a selected
    /// conversation.
    pub fn load(&self, conversation_id: Option<String>, messages: Vec<ChatMessage>) {
        let mut inner = self.inner.write();
        inner.conversation_id = conversation_id;
        inner.messages = messages;
        inner.active_send = None;
    }

    /// Drop everything (whole-conversation deletion, logout).
    pub fn clear(&self) {
        self.load(None, Vec::new());
    }

    // ── Send lifecycle ─────────────────────────────────────────────────

    /// Idle → Optimistic: append the user message and an empty assistant
    /// placeholder, both with locally generated ids.
    pub fn begin_send(&self, text: &str) -> PendingSend {
        let mut inner = self.inner.write();
        if let Some(active) = inner.active_send {
            warn!(
                "[store] begin_send while send {} is outstanding — id reconciliation may misbehave",
                active
            );
        }

        let record = PendingSend {
            correlation_id: Uuid::new_v4(),
            state: SendState::Optimistic,
            user_placeholder: self.ids.next(),
            assistant_placeholder: self.ids.next(),
        };
        let now = Utc::now().to_rfc3339();
        let conversation_id = inner.conversation_id.clone();
        inner.messages.push(ChatMessage {
            id: record.user_placeholder,
            role: Role::User,
            content: text.to_string(),
            conversation_id: conversation_id.clone(),
            created_at: now.clone(),
        });
        inner.messages.push(ChatMessage {
            id: record.assistant_placeholder,
            role: Role::Assistant,
            content: String::new(),
            conversation_id,
            created_at: now,
        });
        inner.active_send = Some(record.correlation_id);
        record
    }

    /// Optimistic → Streaming: append a content delta to the assistant
    /// placeholder, matched by exact id.
    pub fn apply_delta(&self, record: &mut PendingSend, delta: &str) {
        let mut inner = self.inner.write();
        match inner.messages.iter_mut().find(|m| m.id == record.assistant_placeholder) {
            Some(message) => message.content.push_str(delta),
            None => {
                warn!("[store] delta for missing placeholder {}", record.assistant_placeholder);
                return;
            }
        }
        record.state = SendState::Streaming;
    }

    /// Streaming → Reconciled: adopt server-issued ids and the resolved
    /// conversation id. Returns true when the store had no active
    /// conversation and adopted the resolved one (the caller should
    /// refresh the conversation directory).
    pub fn reconcile(&self, record: &mut PendingSend, outcome: &StreamOutcome) -> bool {
        let mut inner = self.inner.write();

        let resolved = outcome
            .conversation_id
            .clone()
            .or_else(|| inner.conversation_id.clone());
        let adopted = inner.conversation_id.is_none() && resolved.is_some();
        inner.conversation_id = resolved.clone();

        if let Some(message) = inner.messages.iter_mut().find(|m| m.id == record.user_placeholder) {
            if let Some(id) = outcome.user_message_id {
                message.id = id;
            }
            message.conversation_id = resolved.clone();
        }
        if let Some(message) = inner
            .messages
            .iter_mut()
            .find(|m| m.id == record.assistant_placeholder)
        {
            if let Some(id) = outcome.assistant_message_id {
                message.id = id;
            }
            message.conversation_id = resolved;
        }

        record.state = SendState::Reconciled;
        if inner.active_send == Some(record.correlation_id) {
            inner.active_send = None;
        }
        adopted
    }

    /// → Failed: remove both of this record's messages so no trace of the
    /// failed send remains. Removal is by exact placeholder id; messages
    /// the record does not own are never touched.
    pub fn roll_back(&self, record: &mut PendingSend) {
        let mut inner = self.inner.write();
        inner
            .messages
            .retain(|m| m.id != record.user_placeholder && m.id != record.assistant_placeholder);
        record.state = SendState::Failed;
        if inner.active_send == Some(record.correlation_id) {
            inner.active_send = None;
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
