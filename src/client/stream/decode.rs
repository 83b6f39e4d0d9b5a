// ── Stream: Line-Buffered Chunk Decoder ────────────────────────────────────
//
// Turns a raw byte stream into complete text lines. Two carries survive
// between `feed` calls:
//   • an undecoded byte tail, when a multi-byte UTF-8 sequence is split
//     across chunk boundaries (decoding each chunk in isolation would
//     garble it);
//   • a decoded text tail, when the last line has no `\n` yet.
//
// There is no error case: invalid byte sequences decode to U+FFFD, never
// an Err.

/// Stateful byte-stream to line splitter.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Bytes that did not yet form a complete UTF-8 sequence.
    pending_bytes: Vec<u8>,
    /// Decoded text that did not yet end in a newline.
    pending_text: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns every line completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending_bytes.extend_from_slice(chunk);
        self.decode_pending();

        let mut lines = Vec::new();
        while let Some(newline) = self.pending_text.find('\n') {
            let line = self.pending_text[..newline].to_string();
            self.pending_text = self.pending_text[newline + 1..].to_string();
            lines.push(line);
        }
        lines
    }

    /// Drain the carries at stream end. An incomplete trailing UTF-8
    /// sequence becomes a replacement character; a non-empty trailing
    /// line is returned as the final line.
    pub fn flush(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            self.pending_text.push(char::REPLACEMENT_CHARACTER);
            self.pending_bytes.clear();
        }
        if self.pending_text.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending_text))
        }
    }

    /// Move every decodable byte from `pending_bytes` into `pending_text`,
    /// leaving only an incomplete trailing sequence (if any) behind.
    fn decode_pending(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(valid) => {
                    self.pending_text.push_str(valid);
                    self.pending_bytes.clear();
                    return;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    // Safe: from_utf8 just validated this prefix.
                    self.pending_text
                        .push_str(std::str::from_utf8(&self.pending_bytes[..valid_up_to]).unwrap_or(""));
                    match e.error_len() {
                        // Incomplete sequence at the end — keep for the next feed.
                        None => {
                            self.pending_bytes.drain(..valid_up_to);
                            return;
                        }
                        // Invalid sequence — replace and keep scanning.
                        Some(bad) => {
                            self.pending_text.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid_up_to + bad);
                        }
                    }
                }
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
