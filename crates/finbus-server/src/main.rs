//! finbus server binary.
//!
//! Loads `finbus.yaml`, sizes the worker pool from it, wires the handler
//! registry, and runs the dispatch server until ctrl-c, then winds workers
//! down within the configured grace period. Feature modules register their
//! handlers on the same registry before `start`.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use finbus_server::config::{self, BusConfig};
use finbus_server::dispatch::HandlerRegistry;
use finbus_server::server::DispatchServer;
use finbus_server::services;

fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = config::load_from_file("finbus.yaml").expect("config load failed");

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if cfg.server.workers > 0 {
        builder.worker_threads(cfg.server.workers);
    }
    let runtime = builder.build().expect("runtime build failed");
    runtime.block_on(run(cfg));
}

async fn run(cfg: BusConfig) {
    let grace = Duration::from_millis(cfg.server.shutdown_grace_ms);

    let registry = Arc::new(HandlerRegistry::new());
    services::register_builtins(&registry);

    let server = DispatchServer::new(cfg, registry);
    server.start().await.expect("server start failed");
    tracing::info!(tags = ?server.registry().tags(), "finbus-server running");

    tokio::signal::ctrl_c().await.expect("ctrl-c handler failed");
    tracing::info!("ctrl-c received, shutting down");
    server.shutdown_with_grace(grace).await;
}
