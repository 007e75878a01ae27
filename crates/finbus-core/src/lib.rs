//! finbus protocol core.
//!
//! Wire-level types shared by the dispatch server and its clients: the
//! [`protocol::Envelope`] exchanged on every request/response, the two
//! codec strategies that put it on the wire, and the unified error type.
//! Nothing in this crate touches the network.

pub mod error;
pub mod protocol;
