//! Whole-envelope JSON codec (canonical path).
//!
//! The entire object graph goes through serde in one step, so payload
//! values keep their types: numbers stay numbers, booleans stay booleans,
//! `null` stays `null`.

use crate::error::{FinbusError, Result};
use crate::protocol::{Envelope, EnvelopeCodec};

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl EnvelopeCodec for JsonCodec {
    fn encode(&self, env: &Envelope) -> Result<String> {
        serde_json::to_string(env).map_err(|e| FinbusError::Encode(e.to_string()))
    }

    fn decode(&self, raw: &str) -> Result<Envelope> {
        serde_json::from_str(raw).map_err(|e| FinbusError::Decode(format!("invalid envelope json: {e}")))
    }
}
