//! Top-level facade crate for finbus.
//!
//! Re-exports the protocol core and the server library so feature modules
//! can depend on a single crate.

pub mod core {
    pub use finbus_core::*;
}

pub mod server {
    pub use finbus_server::*;
}
