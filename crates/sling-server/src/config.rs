//! Server configuration.

use std::net::SocketAddr;

use clap::Parser;

/// Sling relay server: forwards slide, code and whiteboard events between
/// the peers of a room.
#[derive(Parser, Debug, Clone)]
#[command(name = "sling-server", version, about)]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "SLING_BIND", default_value = "0.0.0.0:3030")]
    pub bind: SocketAddr,

    /// Per-room broadcast buffer. Slow clients that fall further behind than
    /// this lose events and must rejoin to catch up.
    #[arg(long, env = "SLING_CHANNEL_CAPACITY", default_value_t = 256)]
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3030)),
            channel_capacity: 256,
        }
    }
}
