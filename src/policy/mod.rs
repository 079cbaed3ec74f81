//! Per-request policy: language detection, completion mode classification,
//! and stop-sequence derivation. Pure decision tables, no I/O.

mod language;
mod mode;
mod stops;

pub use language::Language;
pub use mode::CompletionMode;
pub use stops::{chat_stops, stop_sequences};

/// Safety cap on generated tokens per completion request, applied on top of
/// whatever the client asks for.
pub const HARD_TOKEN_CAP: usize = 64;
