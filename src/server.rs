//! Connection acceptor
//!
//! Accepts TCP connections and spawns one handler task per connection,
//! all sharing a single `Registry`.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info, warn};

use crate::handler::handle_connection;
use crate::registry::Registry;
use crate::types::ClientId;

/// Back-off after running out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The chat relay server
///
/// Owns the listener and the registry. The registry is injected so tests
/// can inspect it.
pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl ChatServer {
    /// Bind a listener with a fresh registry
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::new(listener, Arc::new(Registry::new())))
    }

    /// Create a server from an existing listener and registry
    pub fn new(listener: TcpListener, registry: Arc<Registry>) -> Self {
        Self { listener, registry }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Run the accept loop
    ///
    /// Returns only when the listener fails unrecoverably; the listener is
    /// dropped (closed) on return.
    pub async fn run(self) -> io::Result<()> {
        info!("Chat relay listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let client_id = ClientId::new();
                    info!("New client connected from {}. ID: {}", addr, client_id);

                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", client_id, e);
                    }

                    tokio::spawn(handle_connection(stream, client_id, self.registry.clone()));
                }
                Err(e) if is_transient(&e) => {
                    warn!("Failed to accept connection: {}", e);
                    if is_resource_exhaustion(&e) {
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
                Err(e) => {
                    error!("Server loop error: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

/// Accept errors that concern a single connection, or pass with time
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
    ) || is_resource_exhaustion(err)
}

fn is_resource_exhaustion(err: &io::Error) -> bool {
    // EMFILE / ENFILE
    matches!(err.raw_os_error(), Some(23) | Some(24))
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::codec::{read_packet, write_packet, MAX_FRAME_SIZE, MAX_INBOUND_SIZE};
    use crate::message::{Packet, PacketType};

    const WAIT: Duration = Duration::from_secs(5);

    async fn start() -> (SocketAddr, Arc<Registry>) {
        let server = ChatServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        tokio::spawn(server.run());
        (addr, registry)
    }

    async fn join(addr: SocketAddr, registry: &Registry, name: &str) -> TcpStream {
        let expected = registry.registered_count() + 1;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_packet(&mut stream, PacketType::RegisterName, name)
            .await
            .unwrap();
        wait_until(|| registry.registered_count() == expected).await;
        stream
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        timeout(WAIT, async {
            while !cond() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn recv(stream: &mut TcpStream) -> Packet {
        timeout(WAIT, read_packet(stream))
            .await
            .expect("timed out waiting for packet")
            .expect("stream ended")
    }

    async fn assert_silent(stream: &mut TcpStream) {
        let result = timeout(Duration::from_millis(200), read_packet(stream)).await;
        assert!(result.is_err(), "unexpected packet: {:?}", result);
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&io::Error::from(ErrorKind::ConnectionAborted)));
        assert!(is_transient(&io::Error::from_raw_os_error(24)));
        assert!(!is_transient(&io::Error::from(ErrorKind::InvalidInput)));
        assert!(!is_transient(&io::Error::from(ErrorKind::WouldBlock)));
    }

    #[tokio::test]
    async fn test_enter_chat_and_leave() {
        let (addr, registry) = start().await;
        let mut bob = join(addr, &registry, "bob").await;

        // Entered notice goes to others only
        let mut alice = join(addr, &registry, "alice").await;
        let entered = recv(&mut bob).await;
        assert_eq!(entered.packet_type(), Some(PacketType::ServerInfo));
        assert!(entered.text().contains("alice"));
        assert!(entered.text().contains("Entered"));

        // Chat is relayed with the sender's name and not echoed
        write_packet(&mut alice, PacketType::ChatMessage, "hi")
            .await
            .unwrap();
        let chat = recv(&mut bob).await;
        assert_eq!(chat.packet_type(), Some(PacketType::ChatMessage));
        assert_eq!(chat.text(), "[alice]: hi");
        assert_silent(&mut alice).await;

        // Abrupt close still produces one DISCONNECT_INFO
        drop(alice);
        let info = recv(&mut bob).await;
        assert_eq!(info.packet_type(), Some(PacketType::DisconnectInfo));
        assert_eq!(
            info.text(),
            "Server: 'alice' disconnected. (Sent Messages: 1, Received Messages: 0)"
        );
        assert_silent(&mut bob).await;
        wait_until(|| registry.len() == 1).await;
    }

    #[tokio::test]
    async fn test_duplicate_names_allowed() {
        let (addr, registry) = start().await;
        let mut first = join(addr, &registry, "sam").await;
        let mut second = join(addr, &registry, "sam").await;

        assert_eq!(registry.registered_count(), 2);
        assert!(recv(&mut first).await.text().contains("'sam' Entered"));

        write_packet(&mut second, PacketType::ChatMessage, "which one?")
            .await
            .unwrap();
        assert_eq!(recv(&mut first).await.text(), "[sam]: which one?");
        assert_silent(&mut second).await;
    }

    #[tokio::test]
    async fn test_rejected_client_not_announced() {
        let (addr, registry) = start().await;
        let mut bob = join(addr, &registry, "bob").await;

        let mut eve = TcpStream::connect(addr).await.unwrap();
        write_packet(&mut eve, PacketType::ChatMessage, "let me in")
            .await
            .unwrap();
        let reply = recv(&mut eve).await;
        assert_eq!(reply.packet_type(), Some(PacketType::ServerInfo));

        wait_until(|| registry.len() == 1).await;
        assert_silent(&mut bob).await;
    }

    #[tokio::test]
    async fn test_oversized_frame_drops_sender() {
        let (addr, registry) = start().await;
        let mut bob = join(addr, &registry, "bob").await;
        let mut mallory = join(addr, &registry, "mallory").await;
        recv(&mut bob).await;

        let mut header = u32::MAX.to_be_bytes().to_vec();
        header.extend_from_slice(&PacketType::ChatMessage.code().to_be_bytes());
        mallory.write_all(&header).await.unwrap();

        let info = recv(&mut bob).await;
        assert_eq!(info.packet_type(), Some(PacketType::DisconnectInfo));
        assert!(info.text().contains("'mallory' disconnected"));
        wait_until(|| registry.len() == 1).await;
    }

    #[tokio::test]
    async fn test_registry_consistent_under_churn() {
        let (addr, registry) = start().await;

        let mut tasks = Vec::new();
        for i in 0..16 {
            tasks.push(tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                write_packet(&mut stream, PacketType::RegisterName, &format!("user{i}"))
                    .await
                    .unwrap();
                write_packet(&mut stream, PacketType::ChatMessage, "ping")
                    .await
                    .unwrap();
                if i % 2 == 0 {
                    write_packet(&mut stream, PacketType::DisconnectRequest, "")
                        .await
                        .unwrap();
                    None
                } else {
                    Some(stream)
                }
            }));
        }

        let mut kept = Vec::new();
        for task in tasks {
            if let Some(stream) = task.await.unwrap() {
                kept.push(stream);
            }
        }

        wait_until(|| registry.len() == 8 && registry.registered_count() == 8).await;

        drop(kept);
        wait_until(|| registry.is_empty()).await;
    }

    #[tokio::test]
    async fn test_full_size_chat_does_not_disconnect_peers() {
        let (addr, registry) = start().await;
        let mut bob = join(addr, &registry, "bob").await;
        let mut carol = join(addr, &registry, "carol").await;
        recv(&mut bob).await;
        let mut alice = join(addr, &registry, "alice").await;
        recv(&mut bob).await;
        recv(&mut carol).await;

        // The server stops reading alice after the oversized header
        let body = "x".repeat(MAX_FRAME_SIZE as usize);
        tokio::spawn(async move {
            let _ = write_packet(&mut alice, PacketType::ChatMessage, &body).await;
        });

        for peer in [&mut bob, &mut carol] {
            let info = recv(&mut *peer).await;
            assert_eq!(info.packet_type(), Some(PacketType::DisconnectInfo));
            assert!(info.text().contains("'alice' disconnected"));
        }
        wait_until(|| registry.len() == 2).await;

        // Both peers are still connected and relaying
        write_packet(&mut bob, PacketType::ChatMessage, "still here")
            .await
            .unwrap();
        assert_eq!(recv(&mut carol).await.text(), "[bob]: still here");
    }

    #[tokio::test]
    async fn test_largest_accepted_strings_relay_within_frame_limit() {
        let (addr, registry) = start().await;
        let mut bob = join(addr, &registry, "bob").await;

        let long_name = "n".repeat(MAX_INBOUND_SIZE as usize);
        let mut alice = join(addr, &registry, &long_name).await;
        let entered = recv(&mut bob).await;
        assert!(entered.text().contains(long_name.as_str()));

        let long_message = "m".repeat(MAX_INBOUND_SIZE as usize);
        write_packet(&mut alice, PacketType::ChatMessage, &long_message)
            .await
            .unwrap();
        let chat = recv(&mut bob).await;
        assert_eq!(chat.text(), format!("[{}]: {}", long_name, long_message));
        assert!(chat.len() <= MAX_FRAME_SIZE as usize);

        write_packet(&mut alice, PacketType::DisconnectRequest, "")
            .await
            .unwrap();
        let info = recv(&mut bob).await;
        assert_eq!(info.packet_type(), Some(PacketType::DisconnectInfo));
        assert!(info.text().contains(long_name.as_str()));
    }
}
