// Drift Chat Client Engine
//
// Everything a frontend needs to talk to a Drift chat backend:
// authentication, conversation management, the streaming-send ingestion
// pipeline, and best-effort notification delivery. The crate is pure
// client logic — no rendering, no persistence beyond the TokenStore seam.

pub mod atoms;
pub mod client;
pub mod notify;

pub use atoms::error::{ClientError, ClientResult};
pub use atoms::types::*;
pub use client::auth::{AuthClient, MemoryTokenStore, TokenStore};
pub use client::chat::ChatService;
pub use client::directory::ConversationDirectory;
pub use client::http::ApiClient;
pub use client::store::{MessageStore, PendingSend, SendState};
pub use client::stream::reduce::{read_chunk_stream, StreamOutcome};
pub use client::ClientConfig;
pub use notify::feed::NotificationFeed;
pub use notify::service::NotificationService;
