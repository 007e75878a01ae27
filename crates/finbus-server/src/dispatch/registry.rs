use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use finbus_core::error::Result;
use finbus_core::protocol::Envelope;

use crate::connection::Connection;

/// A capability registered against a type tag. Feature modules (accounts,
/// transactions, users, ...) implement this; the transport never knows
/// their payload schemas.
///
/// Returning `Ok(None)` means fire-and-forget: no response is written.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, conn: Arc<Connection>, req: Envelope) -> Result<Option<Envelope>>;
}

/// Thread-safe mapping from type tag to handler. Mutable at any time while
/// the server runs; lookups never block registration.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler for `tag`, silently replacing any previous one
    /// (last write wins). Never fails.
    pub fn register(&self, tag: impl Into<String>, handler: Arc<dyn Handler>) -> &Self {
        let tag = tag.into();
        tracing::info!(%tag, "handler registered");
        self.handlers.insert(tag, handler);
        self
    }

    /// Remove the handler for `tag` if present; no-op otherwise.
    pub fn unregister(&self, tag: &str) -> &Self {
        self.handlers.remove(tag);
        self
    }

    pub fn resolve(&self, tag: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(tag).map(|e| e.value().clone())
    }

    pub fn tags(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }
}
