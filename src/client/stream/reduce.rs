// ── Stream: Reducer ────────────────────────────────────────────────────────
//
// `read_chunk_stream` turns a raw byte stream into an async sequence of
// parsed chunks with iterator-protocol termination semantics: after the
// `finished` chunk or a single `Err`, the sequence ends — further
// transport data is never read, so "exactly one terminal" holds by
// construction rather than by callback discipline.
//
// `StreamOutcome` folds the sequence: content is appended, metadata is
// latest-wins, `finished` latches.
//
// The producer runs in its own task and forwards over an unbounded mpsc
// channel; dropping the returned stream closes the channel and the
// producer exits on its next send. That drop is the cancellation story —
// there is no separate cancel token.

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::atoms::error::{ClientError, ClientResult};
use crate::atoms::types::{MessageId, StreamChunk};
use crate::client::stream::decode::LineDecoder;
use crate::client::stream::frame::parse_frame;

// ── Folded result ──────────────────────────────────────────────────────────

/// Accumulated state of one streaming send.
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    /// Appended-only running message text.
    pub content: String,
    pub conversation_id: Option<String>,
    pub user_message_id: Option<MessageId>,
    pub assistant_message_id: Option<MessageId>,
    pub finished: bool,
}

impl StreamOutcome {
    /// Fold one chunk in. Content appends; each metadata field overwrites
    /// the captured value only when present in the incoming chunk.
    pub fn absorb(&mut self, chunk: &StreamChunk) {
        if let Some(content) = &chunk.content {
            self.content.push_str(content);
        }
        if let Some(id) = &chunk.conversation_id {
            self.conversation_id = Some(id.clone());
        }
        if let Some(id) = chunk.user_message_id {
            self.user_message_id = Some(id);
        }
        if let Some(id) = chunk.assistant_message_id {
            self.assistant_message_id = Some(id);
        }
        if chunk.finished {
            self.finished = true;
        }
    }
}

// ── Byte stream → chunk stream ─────────────────────────────────────────────

/// Decode a streaming response body into parsed chunks.
///
/// Termination:
///   • the chunk carrying `finished: true` is yielded, then the stream
///     ends (remaining transport data is not read);
///   • a transport read failure or a server `error` chunk yields one
///     `Err`, then the stream ends;
///   • transport EOF without either simply ends the stream (the caller
///     decides whether an unfinished outcome is acceptable).
///
/// Generic over the byte source so tests can script chunk boundaries.
pub fn read_chunk_stream<S, B, E>(bytes: S) -> impl Stream<Item = ClientResult<StreamChunk>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        futures::pin_mut!(bytes);
        let mut decoder = LineDecoder::new();

        'read: while let Some(result) = bytes.next().await {
            let data = match result {
                Ok(data) => data,
                Err(e) => {
                    let _ = tx.send(Err(ClientError::Stream(format!("read failed: {}", e))));
                    return;
                }
            };

            for line in decoder.feed(data.as_ref()) {
                if let Some(chunk) = parse_frame(&line) {
                    if !forward(&tx, chunk) {
                        break 'read;
                    }
                }
            }
        }

        // Transport EOF — a final unterminated line may still hold a frame.
        if let Some(line) = decoder.flush() {
            if let Some(chunk) = parse_frame(&line) {
                forward(&tx, chunk);
            }
        }
    });

    UnboundedReceiverStream::new(rx)
}

/// Send one parsed chunk downstream. Returns false when the stream is
/// terminal (finished, server error, or receiver dropped) and the
/// producer should stop reading.
fn forward(
    tx: &mpsc::UnboundedSender<ClientResult<StreamChunk>>,
    chunk: StreamChunk,
) -> bool {
    if let Some(message) = &chunk.error {
        let _ = tx.send(Err(ClientError::Stream(message.clone())));
        return false;
    }
    let finished = chunk.finished;
    if tx.send(Ok(chunk)).is_err() {
        // Receiver dropped — the caller canceled by ceasing to read.
        return false;
    }
    !finished
}

// ── Tests ──────────────────────────────────────────────────────────────────
