// ── Stream: Event Frame Parser ─────────────────────────────────────────────
//
// Recognizes `data: <json>` framed lines and decodes the payload. Anything
// else — blank keep-alive lines, unknown framing, malformed JSON — is
// skipped: a single bad frame must never abort an otherwise-healthy
// stream. Malformed JSON is logged so server bugs stay visible.

use log::warn;

use crate::atoms::constants::DATA_FRAME_PREFIX;
use crate::atoms::types::{truncate_utf8, StreamChunk};

/// Parse one line into a chunk, or `None` for non-frames.
pub fn parse_frame(line: &str) -> Option<StreamChunk> {
    let data = line.trim().strip_prefix(DATA_FRAME_PREFIX)?;
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            warn!("[stream] skipping malformed frame ({}): {}", e, truncate_utf8(data, 200));
            None
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
