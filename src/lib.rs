//! Multi-client TCP Chat Relay Library
//!
//! A chat relay speaking a small length-prefixed binary protocol over TCP.
//! Clients register a display name, then every chat message they send is
//! relayed to all other registered clients.
//!
//! # Features
//! - Length-prefixed framing (`[length: u32][type: u32][body]`, big-endian)
//! - Name registration gate
//! - Chat relay to all other clients
//! - Join and leave notices with per-client message statistics
//! - Interactive console client helpers
//!
//! # Architecture
//! One tokio task per connection, sharing a `Registry`:
//! - `ChatServer` accepts connections and spawns `handle_connection`
//! - Each `Session` guards its own output with a per-session lock
//! - `Registry::broadcast` snapshots the registry under its lock, then
//!   sends through each recipient's lock (registry before session, always)
//!
//! # Example
//! ```ignore
//! use chat_relay::ChatServer;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = ChatServer::bind("127.0.0.1:8080").await?;
//!     server.run().await
//! }
//! ```

pub mod codec;
pub mod console;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use codec::{
    encode, read_packet, read_packet_with_limit, write_packet, MAX_FRAME_SIZE, MAX_INBOUND_SIZE,
};
pub use error::{AppError, FrameError};
pub use handler::handle_connection;
pub use message::{Packet, PacketType};
pub use registry::Registry;
pub use server::ChatServer;
pub use session::Session;
pub use types::{ClientId, SessionStats};
