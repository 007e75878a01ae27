//! One accepted client connection.
//!
//! The connection owns the write half of its TCP stream for as long as it
//! exists; the read half stays with the worker loop. Two paths write onto
//! the same stream (the worker's reply path and external `send_to` /
//! `broadcast` calls), so every write goes through the async mutex here.

use std::net::SocketAddr;
use std::time::SystemTime;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use finbus_core::error::Result;

pub struct Connection {
    id: u64,
    peer: SocketAddr,
    accepted_at: SystemTime,
    writer: Mutex<OwnedWriteHalf>,
}

impl Connection {
    pub(crate) fn new(writer: OwnedWriteHalf, id: u64, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            accepted_at: SystemTime::now(),
            writer: Mutex::new(writer),
        }
    }

    /// Process-unique id, never reused even after disconnect.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn accepted_at(&self) -> SystemTime {
        self.accepted_at
    }

    /// Write one frame plus the delimiter, serialized against other writers.
    pub async fn send_line(&self, frame: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok(())
    }

    /// Close the write direction. The worker's read half drops with the
    /// worker, which releases the socket fully.
    pub async fn shutdown(&self) -> Result<()> {
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }
}
