//! Shared error type across finbus crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, FinbusError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum FinbusError {
    /// Listening socket could not be bound.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// Accepting a connection failed while the server was running.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    /// Stream-level I/O failure on one connection.
    #[error("stream i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
    /// `send_to` addressed a connection id that is not in the active set.
    #[error("no active connection with id {0}")]
    ConnectionNotFound(u64),
    /// A handler raised a failure while servicing a request.
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("invalid config: {0}")]
    Config(String),
}
