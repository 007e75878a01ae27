//! Dispatch server.
//!
//! Responsibilities:
//! - Own the listening socket; accept connections in a dedicated task
//! - One worker task per connection: welcome, then read-dispatch-reply
//! - Route each inbound envelope to the handler registered under its tag
//! - Addressed (`send_to`) and broadcast sends from outside the worker
//! - Lifecycle: start / stop / restart plus a bounded-grace shutdown
//!
//! Requests on one connection are processed strictly in arrival order (the
//! worker is single-threaded); across connections there is no ordering
//! guarantee. The registry and the active-connection set are the only state
//! shared across workers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use dashmap::DashMap;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use finbus_core::error::{FinbusError, Result};
use finbus_core::protocol::{Envelope, EnvelopeCodec, JsonCodec, TextCodec};

use crate::config::{BusConfig, CodecKind};
use crate::connection::Connection;
use crate::dispatch::HandlerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl ServerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }
}

/// Message-dispatch server over raw TCP, one envelope per line.
///
/// Explicitly constructed and cheap to clone (shared inner); one instance
/// per process is a caller convention, not enforced here.
#[derive(Clone)]
pub struct DispatchServer {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: BusConfig,
    codec: Arc<dyn EnvelopeCodec>,
    registry: Arc<HandlerRegistry>,
    connections: DashMap<u64, Arc<Connection>>,
    workers: DashMap<u64, JoinHandle<()>>,
    next_id: AtomicU64,
    state: AtomicU8,
    shutdown: std::sync::Mutex<watch::Sender<bool>>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
    accept_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DispatchServer {
    pub fn new(cfg: BusConfig, registry: Arc<HandlerRegistry>) -> Self {
        let codec: Arc<dyn EnvelopeCodec> = match cfg.server.codec {
            CodecKind::Json => Arc::new(JsonCodec::new()),
            CodecKind::Text => Arc::new(TextCodec::new()),
        };
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cfg,
                codec,
                registry,
                connections: DashMap::new(),
                workers: DashMap::new(),
                next_id: AtomicU64::new(1),
                state: AtomicU8::new(ServerState::Stopped as u8),
                shutdown: std::sync::Mutex::new(shutdown_tx),
                local_addr: std::sync::Mutex::new(None),
                accept_task: std::sync::Mutex::new(None),
            }),
        }
    }

    // --------------------
    // Lifecycle
    // --------------------

    /// Bind the configured listen address and launch the accept loop.
    /// A second `start` while not stopped logs and returns.
    pub async fn start(&self) -> Result<()> {
        if self.state() != ServerState::Stopped {
            tracing::warn!(state = ?self.state(), "start ignored");
            return Ok(());
        }
        self.set_state(ServerState::Starting);

        let addr = self.inner.cfg.server.listen.clone();
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(source) => {
                self.set_state(ServerState::Stopped);
                return Err(FinbusError::Bind { addr, source });
            }
        };
        *self.inner.local_addr.lock().unwrap() = listener.local_addr().ok();

        let (tx, rx) = watch::channel(false);
        *self.inner.shutdown.lock().unwrap() = tx;

        self.set_state(ServerState::Running);
        tracing::info!(%addr, local = ?self.local_addr(), "dispatch server listening");

        let server = self.clone();
        let handle = tokio::spawn(async move { server.accept_loop(listener, rx).await });
        *self.inner.accept_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Close every active connection, drop the listening socket, and flip
    /// to Stopped. A second `stop` while stopped is a no-op.
    pub async fn stop(&self) {
        if self.state() == ServerState::Stopped {
            return;
        }
        self.set_state(ServerState::Stopping);
        tracing::info!("dispatch server stopping");

        // wake the accept loop and every worker select
        let _ = self.inner.shutdown.lock().unwrap().send(true);

        self.close_all_connections().await;

        let accept = self.inner.accept_task.lock().unwrap().take();
        if let Some(handle) = accept {
            let _ = handle.await;
        }

        self.set_state(ServerState::Stopped);
        tracing::info!("dispatch server stopped");
    }

    /// Best-effort close of the whole active set; one failure must not
    /// block the rest.
    async fn close_all_connections(&self) {
        let conns: Vec<Arc<Connection>> = self
            .inner
            .connections
            .iter()
            .map(|e| e.value().clone())
            .collect();
        self.inner.connections.clear();
        for conn in conns {
            if let Err(e) = conn.shutdown().await {
                tracing::warn!(conn = conn.id(), error = %e, "close failed");
            }
        }
    }

    /// `stop` immediately followed by `start`. Not atomic: a failure in
    /// between leaves the server stopped.
    pub async fn restart(&self) -> Result<()> {
        self.stop().await;
        self.start().await
    }

    /// Process-exit action: stop, then wait for workers up to `grace`,
    /// aborting whatever is still running after that.
    pub async fn shutdown_with_grace(&self, grace: Duration) {
        self.stop().await;

        let ids: Vec<u64> = self.inner.workers.iter().map(|e| *e.key()).collect();
        let mut handles = Vec::new();
        for id in ids {
            if let Some((_, handle)) = self.inner.workers.remove(&id) {
                handles.push(handle);
            }
        }
        if handles.is_empty() {
            return;
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let drained = tokio::time::timeout(grace, futures_util::future::join_all(handles)).await;
        if drained.is_err() {
            tracing::warn!(workers = aborts.len(), "grace period elapsed; aborting workers");
            for abort in aborts {
                abort.abort();
            }
        }
    }

    // --------------------
    // Introspection
    // --------------------

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    pub fn connected_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Resolved listen address; differs from config when bound to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock().unwrap()
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        self.inner.registry.clone()
    }

    fn set_state(&self, state: ServerState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }

    // --------------------
    // Addressed / broadcast sends
    // --------------------

    /// Encode and write on one connection's stream, serialized against the
    /// worker's own replies by the per-connection write lock.
    pub async fn send_to(&self, id: u64, env: &Envelope) -> Result<()> {
        let conn = self
            .inner
            .connections
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(FinbusError::ConnectionNotFound(id))?;
        self.reply(&conn, env).await
    }

    /// Write the same frame to every active connection concurrently.
    /// Individual failures are logged and do not abort the rest.
    pub async fn broadcast(&self, env: &Envelope) -> Result<()> {
        let frame: Arc<str> = self.inner.codec.encode(env)?.into();
        let conns: Vec<Arc<Connection>> = self
            .inner
            .connections
            .iter()
            .map(|e| e.value().clone())
            .collect();

        let mut writes = FuturesUnordered::new();
        for conn in conns {
            let frame = Arc::clone(&frame);
            writes.push(async move { (conn.id(), conn.send_line(&frame).await) });
        }
        while let Some((id, res)) = writes.next().await {
            if let Err(e) = res {
                tracing::warn!(conn = id, error = %e, "broadcast write failed");
            }
        }
        Ok(())
    }

    // --------------------
    // Accept loop
    // --------------------

    async fn accept_loop(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                res = listener.accept() => match res {
                    Ok((stream, peer)) => self.admit(stream, peer, shutdown.clone()),
                    Err(e) => {
                        if self.state() == ServerState::Stopping {
                            tracing::debug!(error = %e, "accept interrupted by shutdown");
                        } else {
                            // no auto-heal: a broken listening socket ends the server
                            let err = FinbusError::Accept(e);
                            tracing::error!(error = %err, "accept failed; terminating accept loop");
                            let _ = self.inner.shutdown.lock().unwrap().send(true);
                            self.close_all_connections().await;
                            self.set_state(ServerState::Stopped);
                        }
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        // listener drops here, closing the listening socket
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr, shutdown: watch::Receiver<bool>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = stream.into_split();
        let conn = Arc::new(Connection::new(write_half, id, peer));
        self.inner.connections.insert(id, Arc::clone(&conn));
        tracing::info!(conn = id, %peer, "connection accepted");

        let server = self.clone();
        let handle = tokio::spawn(async move { server.worker(conn, read_half, shutdown).await });
        self.inner.workers.insert(id, handle);
    }

    // --------------------
    // Per-connection worker
    // --------------------

    async fn worker(
        self,
        conn: Arc<Connection>,
        read_half: OwnedReadHalf,
        shutdown: watch::Receiver<bool>,
    ) {
        let id = conn.id();
        if let Err(e) = self.serve(&conn, read_half, shutdown).await {
            // worker-level failures end this connection only
            tracing::debug!(conn = id, error = %e, "worker exited with error");
        }

        // cleanup runs on every exit path
        if let Err(e) = conn.shutdown().await {
            tracing::debug!(conn = id, error = %e, "close failed");
        }
        self.inner.connections.remove(&id);
        self.inner.workers.remove(&id);
        tracing::info!(conn = id, "connection closed");
    }

    async fn serve(
        &self,
        conn: &Arc<Connection>,
        mut read_half: OwnedReadHalf,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let welcome = Envelope::success("WELCOME", self.inner.cfg.server.welcome.as_str())
            .with("connection_id", conn.id());
        self.reply(conn, &welcome).await?;

        let max_frame = self.inner.cfg.limits.max_frame_bytes;
        let mut buf = BytesMut::with_capacity(4096);

        loop {
            // drain complete frames before reading more
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let frame = buf.split_to(pos + 1);
                let line = std::str::from_utf8(&frame[..pos])
                    .map_err(|e| FinbusError::Decode(format!("frame not utf-8: {e}")))?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                self.handle_frame(conn, line).await?;
            }

            if buf.len() > max_frame {
                return Err(FinbusError::Decode(format!(
                    "frame exceeds {max_frame} bytes"
                )));
            }

            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                n = read_half.read_buf(&mut buf) => {
                    if n? == 0 {
                        return Ok(()); // peer closed
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, conn: &Arc<Connection>, line: &str) -> Result<()> {
        match self.inner.codec.decode(line) {
            Ok(req) => self.dispatch(conn, req).await,
            Err(e) => {
                // malformed envelope: answer, keep the worker alive
                let resp = Envelope::error("ERROR", format!("malformed envelope: {e}"));
                self.reply(conn, &resp).await
            }
        }
    }

    /// Resolve the type tag and invoke the handler. A missing handler or a
    /// handler failure becomes an ERROR envelope on the same connection;
    /// neither ends the worker.
    async fn dispatch(&self, conn: &Arc<Connection>, req: Envelope) -> Result<()> {
        let tag = req.msg_type.clone();
        let response = match self.inner.registry.resolve(&tag) {
            None => Some(Envelope::error(
                tag.as_str(),
                format!("unsupported type: {tag}"),
            )),
            Some(handler) => match handler.handle(Arc::clone(conn), req).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(conn = conn.id(), %tag, error = %e, "handler failed");
                    Some(Envelope::error(tag.as_str(), e.to_string()))
                }
            },
        };

        match response {
            Some(resp) => self.reply(conn, &resp).await,
            None => Ok(()), // fire-and-forget tag
        }
    }

    async fn reply(&self, conn: &Connection, env: &Envelope) -> Result<()> {
        conn.send_line(&self.inner.codec.encode(env)?).await
    }
}
