use std::sync::Arc;

use async_trait::async_trait;

use finbus_core::error::Result;
use finbus_core::protocol::Envelope;

use crate::connection::Connection;
use crate::dispatch::Handler;

pub const TAG: &str = "AUDIT";

/// Fire-and-forget event sink: clients report UI-side events (login,
/// export, sync) and expect no reply. Returning `None` exercises the
/// no-response dispatch path in production, not just in tests.
#[derive(Default)]
pub struct AuditService;

impl AuditService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for AuditService {
    async fn handle(&self, conn: Arc<Connection>, req: Envelope) -> Result<Option<Envelope>> {
        tracing::info!(conn = conn.id(), event = %req.content, "audit event");
        Ok(None)
    }
}
