// ── Client: Chat Service ───────────────────────────────────────────────────
//
// The /chat/* endpoints, wired to the reconciliation store and the
// conversation directory. The streaming send is the interesting path:
//
//   begin_send (optimistic pair) → POST /chat/send-stream →
//   read_chunk_stream (bytes → chunks) → apply_delta per content chunk →
//   reconcile on completion → directory refresh if a conversation was
//   adopted.
//
// Any failure before completion rolls the optimistic pair back — the
// list shows no trace of a failed send.

use futures::StreamExt;
use log::{info, warn};
use reqwest::Method;

use crate::atoms::constants::DEFAULT_PAGE_LIMIT;
use crate::atoms::error::ClientResult;
use crate::atoms::types::{
    ChatMessage, HistoryResponse, NewConversationResponse, SendRequest, SendResponse,
};
use crate::client::directory::ConversationDirectory;
use crate::client::http::ApiClient;
use crate::client::store::MessageStore;
use crate::client::stream::reduce::{read_chunk_stream, StreamOutcome};

#[derive(Clone)]
pub struct ChatService {
    api: ApiClient,
    store: MessageStore,
    directory: ConversationDirectory,
}

impl ChatService {
    pub fn new(api: ApiClient, store: MessageStore, directory: ConversationDirectory) -> Self {
        Self { api, store, directory }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    // ── Sending ────────────────────────────────────────────────────────

    /// Streaming send. `on_delta` fires once per content chunk, in
    /// arrival order, after the delta has been applied to the store —
    /// the UI re-renders from the store on each call.
    pub async fn send_message_stream(
        &self,
        text: &str,
        mut on_delta: impl FnMut(&str),
    ) -> ClientResult<StreamOutcome> {
        let mut record = self.store.begin_send(text);
        let request = SendRequest {
            message: text.to_string(),
            conversation_id: self.store.current_conversation(),
        };

        let response = match self
            .api
            .stream_request(Method::POST, "/chat/send-stream", Some(&request))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.store.roll_back(&mut record);
                return Err(e);
            }
        };

        let mut outcome = StreamOutcome::default();
        let mut chunks = std::pin::pin!(read_chunk_stream(response.bytes_stream()));
        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    if let Some(delta) = &chunk.content {
                        self.store.apply_delta(&mut record, delta);
                        on_delta(delta);
                    }
                    outcome.absorb(&chunk);
                }
                Err(e) => {
                    self.store.roll_back(&mut record);
                    return Err(e);
                }
            }
        }

        let adopted = self.store.reconcile(&mut record, &outcome);
        if adopted {
            info!(
                "[chat] adopted conversation {:?} from first send",
                outcome.conversation_id
            );
            if self.directory.refresh().await.is_err() {
                warn!("[chat] directory refresh after adoption failed");
            }
        }
        Ok(outcome)
    }

    /// Non-streaming send: same optimistic lifecycle, one-shot response.
    pub async fn send_message(&self, text: &str) -> ClientResult<SendResponse> {
        let mut record = self.store.begin_send(text);
        let request = SendRequest {
            message: text.to_string(),
            conversation_id: self.store.current_conversation(),
        };

        match self.api.post_json::<SendResponse, _>("/chat/send", &request).await {
            Ok(response) => {
                self.store.apply_delta(&mut record, &response.content);
                let outcome = StreamOutcome {
                    content: response.content.clone(),
                    conversation_id: Some(response.conversation_id.clone()),
                    user_message_id: Some(response.user_message_id),
                    assistant_message_id: Some(response.assistant_message_id),
                    finished: true,
                };
                if self.store.reconcile(&mut record, &outcome) {
                    let _ = self.directory.refresh().await;
                }
                Ok(response)
            }
            Err(e) => {
                self.store.roll_back(&mut record);
                Err(e)
            }
        }
    }

    // ── History & conversations ────────────────────────────────────────

    pub async fn history(&self, conversation_id: &str, limit: u32) -> ClientResult<Vec<ChatMessage>> {
        let path = format!("/chat/history/{}?limit={}", conversation_id, limit);
        let response: HistoryResponse = self.api.get_json(&path).await?;
        Ok(response.messages)
    }

    /// Select a conversation: fetch its history and load it into the store.
    pub async fn open_conversation(&self, conversation_id: &str) -> ClientResult<()> {
        let messages = self.history(conversation_id, DEFAULT_PAGE_LIMIT).await?;
        self.store.load(Some(conversation_id.to_string()), messages);
        Ok(())
    }

    /// Create an empty conversation, select it, refresh the directory.
    pub async fn new_conversation(&self) -> ClientResult<String> {
        let response: NewConversationResponse =
            self.api.post_json("/chat/conversations/new", &()).await?;
        self.store.load(Some(response.conversation_id.clone()), Vec::new());
        let _ = self.directory.refresh().await;
        Ok(response.conversation_id)
    }

    /// Delete a conversation. If it is the active one, the message list
    /// is cleared too. The directory is refreshed afterwards.
    pub async fn delete_conversation(&self, conversation_id: &str) -> ClientResult<()> {
        self.api
            .delete(&format!("/chat/conversations/{}", conversation_id))
            .await?;
        if self.store.current_conversation().as_deref() == Some(conversation_id) {
            self.store.clear();
        }
        let _ = self.directory.refresh().await;
        Ok(())
    }
}
