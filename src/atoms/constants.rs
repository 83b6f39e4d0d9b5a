// ── Atoms: Constants ───────────────────────────────────────────────────────
// All named constants for the crate live here.
// Rationale: collecting constants in one place eliminates magic strings
// and keeps every layer's code self-documenting.

use std::time::Duration;

// ── Streaming wire format ──────────────────────────────────────────────────
// Lines on the /chat/send-stream and /notifications/stream bodies are either
// blank or `data: <json>`. The prefix includes the trailing space.
pub const DATA_FRAME_PREFIX: &str = "data: ";

// ── Notification delivery ──────────────────────────────────────────────────

/// Default interval between notification polls.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(5_000);

/// Delay before degrading from the push channel to polling after a
/// channel error. Fixed, not backed off — one bad connection should not
/// leave the user without notifications for long.
pub const PUSH_FALLBACK_DELAY: Duration = Duration::from_secs(1);

/// Consumer-side notification buffer size. Oldest entries evicted first.
pub const NOTIFICATION_BUFFER_CAP: usize = 100;

// ── HTTP client ────────────────────────────────────────────────────────────

/// TCP connect timeout for the shared client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request timeout for non-streaming calls. Streaming responses are
/// exempt (reqwest applies this to the full body read, which would kill
/// long chats) — see `ApiClient::stream_request`.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Default history / conversation-list page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
