//! Built-in transport-level services.
//!
//! The real feature handlers (accounts, transactions, users, cards,
//! categories, tags) live in their own modules and register themselves
//! against the registry at startup; these are the few the transport itself
//! ships.

pub mod audit;
pub mod echo;
pub mod ping;

pub use audit::AuditService;
pub use echo::EchoService;
pub use ping::PingService;

use std::sync::Arc;

use crate::dispatch::HandlerRegistry;

/// Register every built-in under its tag.
pub fn register_builtins(registry: &HandlerRegistry) {
    registry
        .register(ping::TAG, Arc::new(PingService::new()))
        .register(echo::TAG, Arc::new(EchoService::new()))
        .register(audit::TAG, Arc::new(AuditService::new()));
}
