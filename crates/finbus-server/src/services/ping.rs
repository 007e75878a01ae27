use std::sync::Arc;

use async_trait::async_trait;

use finbus_core::error::Result;
use finbus_core::protocol::Envelope;

use crate::connection::Connection;
use crate::dispatch::Handler;

pub const TAG: &str = "PING";

/// Liveness check. Useful to prove dispatch end to end.
#[derive(Default)]
pub struct PingService;

impl PingService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for PingService {
    async fn handle(&self, _conn: Arc<Connection>, _req: Envelope) -> Result<Option<Envelope>> {
        Ok(Some(Envelope::success(TAG, "pong")))
    }
}
