//! Chat Relay Server - Entry Point
//!
//! Binds the listener and runs the accept loop.

use std::env;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::ChatServer;

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let server = ChatServer::bind(&addr).await?;
    info!("Chat Server started on {}", addr);

    if let Err(e) = server.run().await {
        error!("Listener failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
