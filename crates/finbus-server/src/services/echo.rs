use std::sync::Arc;

use async_trait::async_trait;

use finbus_core::error::Result;
use finbus_core::protocol::Envelope;

use crate::connection::Connection;
use crate::dispatch::Handler;

pub const TAG: &str = "ECHO";

/// Echo the request payload back under a SUCCESS envelope.
#[derive(Default)]
pub struct EchoService;

impl EchoService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for EchoService {
    async fn handle(&self, _conn: Arc<Connection>, req: Envelope) -> Result<Option<Envelope>> {
        let mut resp = Envelope::success(TAG, req.content.as_str());
        resp.data = req.data;
        Ok(Some(resp))
    }
}
