//! Sling WebSocket relay server.

use std::sync::Arc;

use clap::Parser;
use sling_server::{AppState, ServerConfig};
use tracing::info;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sling_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::parse();
    let state = Arc::new(AppState::new(config.channel_capacity));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("Sling relay server listening on {}", listener.local_addr()?);
    info!("WebSocket endpoint: ws://{}/ws", config.bind);

    sling_server::serve(listener, state).await
}
