//! Protocol modules (envelope + codecs).
//!
//! Two codec strategies coexist behind [`EnvelopeCodec`]:
//! - `json`: whole-envelope serialization via serde, the canonical path.
//! - `text`: a hand-rolled brace/bracket format kept for compatibility with
//!   the legacy desktop client.
//!
//! All parsers are panic-free: malformed input is reported as
//! `FinbusError::Decode` instead of panicking or indexing raw buffers.

pub mod envelope;
pub mod json;
pub mod text;

pub use envelope::{Envelope, Status};
pub use json::JsonCodec;
pub use text::TextCodec;

use crate::error::Result;

/// Encode/decode pair converting an [`Envelope`] to and from one wire frame.
///
/// Implementations must be round-trip-safe for every value the payload bag
/// can legally hold, within each codec's documented coercion rules.
pub trait EnvelopeCodec: Send + Sync {
    fn encode(&self, env: &Envelope) -> Result<String>;
    fn decode(&self, raw: &str) -> Result<Envelope>;
}
