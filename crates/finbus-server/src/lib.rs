//! finbus server library entry.
//!
//! This crate wires the TCP transport, handler registry, dispatch server,
//! config loader, and built-in services into a cohesive backend stack. It is
//! intended to be consumed by the binary (`main.rs`), by feature modules
//! registering their own handlers, and by integration tests.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod server;
pub mod services;
