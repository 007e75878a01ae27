use serde::Deserialize;

use finbus_core::error::{FinbusError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub limits: Limits,
}

impl BusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(FinbusError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.server.validate()?;
        self.limits.validate()?;

        Ok(())
    }
}

/// Which wire strategy this server speaks. The two encodings are not
/// interoperable on one socket, so the choice is per server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub codec: CodecKind,

    #[serde(default = "default_welcome")]
    pub welcome: String,

    /// Worker threads for the runtime; 0 means the runtime default.
    #[serde(default)]
    pub workers: usize,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            codec: CodecKind::default(),
            welcome: default_welcome(),
            workers: 0,
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        // SocketAddr parsing rejects malformed hosts and ports outside
        // 0-65535 before the server ever tries to bind.
        self.listen
            .parse::<std::net::SocketAddr>()
            .map_err(|e| FinbusError::Config(format!("server.listen invalid: {e}")))?;

        if self.workers > 512 {
            return Err(FinbusError::Config(
                "server.workers must be at most 512".into(),
            ));
        }
        if !(500..=60000).contains(&self.shutdown_grace_ms) {
            return Err(FinbusError::Config(
                "server.shutdown_grace_ms must be between 500 and 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1:7450".into()
}
fn default_welcome() -> String {
    "finbus ready".into()
}
fn default_shutdown_grace_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl Limits {
    pub fn validate(&self) -> Result<()> {
        if !(512..=1_048_576).contains(&self.max_frame_bytes) {
            return Err(FinbusError::Config(
                "limits.max_frame_bytes must be between 512 and 1048576".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_frame_bytes() -> usize {
    65536
}
