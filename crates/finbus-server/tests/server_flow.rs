//! End-to-end dispatch tests over real sockets.
//!
//! Known gap, preserved deliberately: the protocol has no read/write
//! deadline, so an unresponsive peer parks its worker until shutdown.
//! Nothing here asserts a timeout because the layer does not have one.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use finbus_core::error::{FinbusError, Result};
use finbus_core::protocol::{Envelope, EnvelopeCodec, JsonCodec, Status};
use finbus_server::config;
use finbus_server::connection::Connection;
use finbus_server::dispatch::{Handler, HandlerRegistry};
use finbus_server::server::{DispatchServer, ServerState};
use finbus_server::services;

struct FailService;

#[async_trait]
impl Handler for FailService {
    async fn handle(&self, _conn: Arc<Connection>, _req: Envelope) -> Result<Option<Envelope>> {
        Err(FinbusError::Handler("repository unavailable".into()))
    }
}

struct SlowService;

#[async_trait]
impl Handler for SlowService {
    async fn handle(&self, _conn: Arc<Connection>, _req: Envelope) -> Result<Option<Envelope>> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(Some(Envelope::success("SLOW", "done")))
    }
}

async fn start_server() -> DispatchServer {
    let cfg = config::load_from_str("version: 1\nserver:\n  listen: \"127.0.0.1:0\"\n").unwrap();
    let registry = Arc::new(HandlerRegistry::new());
    services::register_builtins(&registry);
    registry
        .register("FAIL", Arc::new(FailService))
        .register("SLOW", Arc::new(SlowService));
    let server = DispatchServer::new(cfg, registry);
    server.start().await.unwrap();
    server
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    conn_id: u64,
}

impl Client {
    /// Connect and consume the welcome envelope (which carries our id).
    async fn connect(server: &DispatchServer) -> Client {
        let stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
        let (rd, wr) = stream.into_split();
        let mut lines = BufReader::new(rd).lines();

        let welcome = JsonCodec.decode(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(welcome.msg_type, "WELCOME");
        assert_eq!(welcome.status, Status::Success);
        let conn_id = welcome.get("connection_id").unwrap().as_u64().unwrap();

        Client {
            lines,
            writer: wr,
            conn_id,
        }
    }

    async fn send(&mut self, env: &Envelope) {
        self.send_raw(&JsonCodec.encode(env).unwrap()).await;
    }

    async fn send_raw(&mut self, frame: &str) {
        self.writer.write_all(frame.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn recv(&mut self) -> Envelope {
        JsonCodec.decode(&self.lines.next_line().await.unwrap().unwrap()).unwrap()
    }
}

#[tokio::test]
async fn ping_round_trip() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    client.send(&Envelope::new("PING")).await;
    let resp = client.recv().await;
    assert_eq!(resp.msg_type, "PING");
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.content, "pong");

    server.stop().await;
}

#[tokio::test]
async fn unknown_type_gets_error_and_connection_survives() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    client.send(&Envelope::new("UNKNOWN")).await;
    let resp = client.recv().await;
    assert_eq!(resp.msg_type, "UNKNOWN");
    assert_eq!(resp.status, Status::Error);
    assert!(resp.content.contains("unsupported type"));

    // server still running, same connection still serviced
    assert!(server.is_running());
    client.send(&Envelope::new("PING")).await;
    assert_eq!(client.recv().await.content, "pong");

    server.stop().await;
}

#[tokio::test]
async fn malformed_frame_answered_with_error_envelope() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    client.send_raw("this is not an envelope").await;
    let resp = client.recv().await;
    assert_eq!(resp.msg_type, "ERROR");
    assert_eq!(resp.status, Status::Error);
    assert!(resp.content.contains("malformed envelope"));

    // worker survives a bad frame
    client.send(&Envelope::new("PING")).await;
    assert_eq!(client.recv().await.content, "pong");

    server.stop().await;
}

#[tokio::test]
async fn handler_failure_isolated_across_connections() {
    let server = start_server().await;
    let mut failing = Client::connect(&server).await;
    let mut healthy = Client::connect(&server).await;

    // B's request is in flight while A's handler raises
    let (fail_resp, slow_resp) = tokio::join!(
        async {
            failing.send(&Envelope::new("FAIL")).await;
            failing.recv().await
        },
        async {
            healthy.send(&Envelope::new("SLOW")).await;
            healthy.recv().await
        }
    );

    assert_eq!(fail_resp.msg_type, "FAIL");
    assert_eq!(fail_resp.status, Status::Error);
    assert!(fail_resp.content.contains("repository unavailable"));

    assert_eq!(slow_resp.msg_type, "SLOW");
    assert_eq!(slow_resp.status, Status::Success);

    assert!(server.is_running());
    server.stop().await;
}

#[tokio::test]
async fn connection_ids_strictly_increase_across_disconnects() {
    let server = start_server().await;

    let first = Client::connect(&server).await.conn_id;
    let second = Client::connect(&server).await.conn_id;
    drop_then_settle().await;
    let third = Client::connect(&server).await.conn_id;

    assert!(first < second, "ids must increase: {first} vs {second}");
    assert!(second < third, "ids never reused after disconnect: {second} vs {third}");

    server.stop().await;
}

async fn drop_then_settle() {
    // earlier clients dropped above; give their workers a beat to clean up
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn echo_round_trips_payload() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    let req = Envelope::new("ECHO")
        .with("note", "a,b")
        .with("amount", 1250)
        .with("tags", serde_json::json!(["rent", "monthly"]));
    client.send(&req).await;

    let resp = client.recv().await;
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.data, req.data);

    server.stop().await;
}

#[tokio::test]
async fn audit_is_fire_and_forget() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    let mut audit = Envelope::new("AUDIT");
    audit.set_content("export-started");
    client.send(&audit).await;

    // the next frame on the wire is PING's reply, not an AUDIT response
    client.send(&Envelope::new("PING")).await;
    let resp = client.recv().await;
    assert_eq!(resp.msg_type, "PING");
    assert_eq!(resp.content, "pong");

    server.stop().await;
}

#[tokio::test]
async fn broadcast_reaches_every_connection() {
    let server = start_server().await;
    let mut a = Client::connect(&server).await;
    let mut b = Client::connect(&server).await;

    server
        .broadcast(&Envelope::success("SYNC", "refresh"))
        .await
        .unwrap();

    assert_eq!(a.recv().await.msg_type, "SYNC");
    assert_eq!(b.recv().await.msg_type, "SYNC");

    server.stop().await;
}

#[tokio::test]
async fn send_to_addresses_one_connection() {
    let server = start_server().await;
    let mut a = Client::connect(&server).await;
    let mut b = Client::connect(&server).await;

    server
        .send_to(b.conn_id, &Envelope::success("NUDGE", "hello b"))
        .await
        .unwrap();
    assert_eq!(b.recv().await.content, "hello b");

    // a sees nothing out of band; its next reply is still its own
    a.send(&Envelope::new("PING")).await;
    assert_eq!(a.recv().await.msg_type, "PING");

    server.stop().await;
}

#[tokio::test]
async fn send_to_unknown_id_fails_typed() {
    let server = start_server().await;

    let err = server
        .send_to(9999, &Envelope::new("PING"))
        .await
        .expect_err("must fail");
    assert!(matches!(err, FinbusError::ConnectionNotFound(9999)));

    server.stop().await;
}

#[tokio::test]
async fn stop_empties_active_set_and_invalidates_ids() {
    let server = start_server().await;
    let client = Client::connect(&server).await;
    let id = client.conn_id;
    assert_eq!(server.connected_count(), 1);

    server.stop().await;
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.connected_count(), 0);

    let err = server
        .send_to(id, &Envelope::new("PING"))
        .await
        .expect_err("must fail after stop");
    assert!(matches!(err, FinbusError::ConnectionNotFound(_)));
}

#[tokio::test]
async fn restart_serves_again_and_keeps_id_counter() {
    let server = start_server().await;
    let before = Client::connect(&server).await.conn_id;

    server.restart().await.unwrap();
    assert!(server.is_running());

    let after = Client::connect(&server).await.conn_id;
    assert!(after > before, "id counter survives restart: {before} vs {after}");

    server.stop().await;
}

#[tokio::test]
async fn double_start_and_double_stop_are_noops() {
    let server = start_server().await;
    let addr = server.local_addr();

    server.start().await.unwrap();
    assert_eq!(server.local_addr(), addr);
    assert!(server.is_running());

    server.stop().await;
    server.stop().await;
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn graceful_shutdown_drains_workers() {
    let server = start_server().await;
    let _client = Client::connect(&server).await;

    server.shutdown_with_grace(Duration::from_millis(500)).await;
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.connected_count(), 0);
}
