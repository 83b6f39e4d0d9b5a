// ── Client: Streaming Ingestion Pipeline ───────────────────────────────────
// Bytes → lines → frames → chunks, with at most one terminal item.
// Each stage is its own module so it can be tested without a network.

pub mod decode;
pub mod frame;
pub mod reduce;
