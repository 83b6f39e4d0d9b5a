// ── Atoms: Wire & Domain Types ─────────────────────────────────────────────
// These are the data structures that flow through the entire client:
// chat messages, conversation summaries, stream chunks, notification
// events, and the auth request/response pairs. They are independent of
// any transport.

use serde::{Deserialize, Serialize};

// ── Identifiers ────────────────────────────────────────────────────────────

/// Message identifier. Server-assigned ids are positive integers;
/// client-side placeholder ids are epoch milliseconds (see
/// `client::store::PlaceholderIds`), unique within a session and replaced
/// — never duplicated — once the server id is known.
pub type MessageId = i64;

// ── Messages ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// RFC-3339 timestamp.
    pub created_at: String,
}

/// Conversation summary. Owned by the `ConversationDirectory`; refreshed
/// wholesale from the server, never locally mutated field-by-field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub conversation_id: String,
    pub last_message: String,
    pub last_updated: String,
}

// ── Streaming wire format ──────────────────────────────────────────────────

/// One frame of a `/chat/send-stream` response body. Transient: consumed
/// by the stream reducer and discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message_id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_message_id: Option<MessageId>,
}

// ── Notifications ──────────────────────────────────────────────────────────

/// A discrete notification event. `event_id` is an opaque string whose
/// lexicographic order is assumed to track arrival time (the poller's
/// watermark depends on it — see `notify::poller`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    pub event_id: String,
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub timestamp: String,
}

/// Batch returned by the recent-notifications fetch endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationBatch {
    pub events: Vec<NotificationEvent>,
    pub count: usize,
    pub timestamp: String,
}

/// Read-only snapshot of the notification service. Recomputed on demand,
/// not independently stored.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceStatus {
    pub is_polling: bool,
    pub is_push_connected: bool,
    pub push_supported: bool,
    pub polling_interval_ms: u64,
    pub last_event_id: Option<String>,
}

// ── Auth wire types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
}

impl LoginRequest {
    pub fn credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            anonymous: false,
        }
    }

    pub fn anonymous() -> Self {
        Self { username: None, password: None, anonymous: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

// ── Chat wire types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SendRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Non-streaming send response: the full assistant reply in one shot.
#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    pub content: String,
    pub conversation_id: String,
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewConversationResponse {
    pub conversation_id: String,
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Truncate a string to at most `max` bytes without splitting a UTF-8
/// character. Used to keep error bodies and malformed frames short in logs.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
