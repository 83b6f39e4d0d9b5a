// ── Notify Layer ───────────────────────────────────────────────────────────
// Best-effort notification delivery: a polling strategy, a push (SSE)
// strategy with automatic degrade-to-polling, a subscriber registry, and
// the consumer-side de-dup feed. Failures here are absorbed and logged —
// nothing in this layer is allowed to take the app down.

pub mod feed;
pub mod poller;
pub mod push;
pub mod service;

pub use feed::NotificationFeed;
pub use poller::{HttpNotificationSource, NotificationSource};
pub use push::{HttpPushChannel, PushChannel};
pub use service::{ListenerId, NotificationService};
