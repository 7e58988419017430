//! Sealswap Server
//!
//! Coordinator for two-party simultaneous reveals. Serves the WebSocket
//! ingress and drives channel lifecycle, submissions, reveals, and expiry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sealswap::network::auth::AuthConfig;
use sealswap::network::channel::InMemoryChannels;
use sealswap::network::server::{ExchangeServer, ServerConfig};
use sealswap::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config()?;
    let auth = AuthConfig::from_env();

    info!("Sealswap Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!("Match expiry: {}s", config.expiry.as_secs());
    if !auth.is_configured() {
        warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM configured - all clients will fail auth");
    }

    let channels = Arc::new(InMemoryChannels::new());
    let server = ExchangeServer::new(config, auth, channels);
    server.run().await?;

    Ok(())
}

/// Build the server configuration, with environment overrides.
fn load_config() -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::default();

    if let Ok(addr) = std::env::var("BIND_ADDR") {
        config.bind_addr = addr.parse()?;
    }
    if let Ok(secs) = std::env::var("MATCH_EXPIRY_SECS") {
        config.expiry = Duration::from_secs(secs.parse()?);
    }
    if let Ok(limit) = std::env::var("MAX_CONNECTIONS") {
        config.max_connections = limit.parse()?;
    }

    Ok(config)
}
