// ── Client: Conversation Directory ─────────────────────────────────────────
//
// In-memory cache of conversation summaries. Refreshed wholesale from the
// server — after create, delete, or the first message of a new
// conversation — and never mutated field-by-field: the server owns the
// ordering and the `last_message` previews.

use log::{info, warn};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::atoms::constants::DEFAULT_PAGE_LIMIT;
use crate::atoms::error::ClientResult;
use crate::atoms::types::{Conversation, ConversationsResponse};
use crate::client::http::ApiClient;

#[derive(Clone)]
pub struct ConversationDirectory {
    api: ApiClient,
    cache: Arc<RwLock<Vec<Conversation>>>,
}

impl ConversationDirectory {
    pub fn new(api: ApiClient) -> Self {
        Self { api, cache: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Reload the cache from the server. The previous contents are kept
    /// if the fetch fails, so a blip never blanks the sidebar.
    pub async fn refresh(&self) -> ClientResult<Vec<Conversation>> {
        let path = format!("/chat/conversations?limit={}", DEFAULT_PAGE_LIMIT);
        match self.api.get_json::<ConversationsResponse>(&path).await {
            Ok(response) => {
                info!("[directory] refreshed {} conversations", response.conversations.len());
                *self.cache.write() = response.conversations.clone();
                Ok(response.conversations)
            }
            Err(e) => {
                warn!("[directory] refresh failed, keeping cached list: {}", e);
                Err(e)
            }
        }
    }

    /// Current cached summaries (possibly stale; call `refresh` to sync).
    pub fn snapshot(&self) -> Vec<Conversation> {
        self.cache.read().clone()
    }

    /// Drop the cache without hitting the server (logout).
    pub fn invalidate(&self) {
        self.cache.write().clear();
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
