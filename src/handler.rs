//! Connection handler
//!
//! Drives one client connection through its lifecycle:
//! registration, message relay, and disconnection.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tracing::{debug, info, warn};

use crate::codec::{encode, read_packet_with_limit, MAX_INBOUND_SIZE};
use crate::error::{AppError, FrameError};
use crate::message::{Packet, PacketType};
use crate::registry::Registry;
use crate::session::Session;
use crate::types::ClientId;

/// Handle a new connection
///
/// The session is added to the registry before the registration packet is
/// read, and removed exactly once when the connection ends. All errors are
/// handled here; nothing propagates to the accept loop.
pub async fn handle_connection<S>(stream: S, client_id: ClientId, registry: Arc<Registry>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let session = Arc::new(Session::new(client_id, writer));

    registry.add(session.clone());

    match register(&mut reader, &session, &registry).await {
        Ok(name) => {
            let notice = format!("Server: '{}' Entered.", name);
            info!("{}", notice);
            announce(registry.as_ref(), PacketType::ServerInfo, &notice, Some(client_id)).await;
        }
        Err(e) => {
            if let Some(notice) = e.rejection_notice() {
                warn!("Rejecting client {}: {}", client_id, e);
                match encode(PacketType::ServerInfo, notice) {
                    Ok(frame) => session.send(&frame).await,
                    Err(e) => warn!("Failed to encode rejection for {}: {}", client_id, e),
                }
            } else {
                log_exit(&session, &e);
            }
            registry.remove(client_id);
            session.close().await;
            info!("Client {} disconnected before registering", client_id);
            return;
        }
    }

    match relay(&mut reader, &session, &registry).await {
        Ok(()) => info!("Client {} sent DISCONNECT_REQUEST", session.display_name()),
        Err(e) => log_exit(&session, &e),
    }

    terminate(&session, &registry).await;
}

/// Read the first packet and record the client's name
async fn register<R>(
    reader: &mut ReadHalf<R>,
    session: &Session,
    registry: &Registry,
) -> Result<String, AppError>
where
    R: AsyncRead,
{
    let packet = next_packet(reader, session).await?;

    if packet.packet_type() != Some(PacketType::RegisterName) {
        return Err(AppError::NameRequired);
    }

    let name = packet.text().trim().to_string();
    if name.is_empty() {
        return Err(AppError::EmptyName);
    }

    session.set_name(name.clone());
    debug!(
        "Client {} registered as '{}' ({} registered)",
        session.id(),
        name,
        registry.registered_count()
    );
    Ok(name)
}

/// Relay chat messages until a disconnect request or read failure
///
/// Returns Ok on DISCONNECT_REQUEST.
async fn relay<R>(
    reader: &mut ReadHalf<R>,
    session: &Session,
    registry: &Registry,
) -> Result<(), AppError>
where
    R: AsyncRead,
{
    let name = session.display_name();

    loop {
        let packet = next_packet(reader, session).await?;

        match packet.packet_type() {
            Some(PacketType::ChatMessage) => {
                let message = packet.text();
                session.record_sent();
                debug!("Chat from {}: {}", name, message);

                let relayed = format!("[{}]: {}", name, message);
                announce(registry, PacketType::ChatMessage, &relayed, Some(session.id())).await;
            }
            Some(PacketType::DisconnectRequest) => return Ok(()),
            _ => {
                debug!("Ignoring packet type {} from {}", packet.kind(), name);
            }
        }
    }
}

/// Remove the session, announce its statistics, and close the socket
async fn terminate(session: &Session, registry: &Registry) {
    // Only the call that actually removes the entry announces the departure
    if registry.remove(session.id()).is_none() {
        session.close().await;
        return;
    }

    let notice = format!(
        "Server: '{}' disconnected. ({})",
        session.display_name(),
        session.stats()
    );
    info!("{}", notice);

    announce(registry, PacketType::DisconnectInfo, &notice, None).await;

    session.close().await;
}

/// Encode a server-built packet and broadcast it
async fn announce(registry: &Registry, kind: PacketType, text: &str, exclude: Option<ClientId>) {
    match encode(kind, text) {
        Ok(frame) => registry.broadcast(&frame, exclude).await,
        Err(e) => warn!("Dropping {} broadcast: {}", kind, e),
    }
}

/// Read the next client packet, giving up if the session's output is closed
///
/// Client bodies are capped at `MAX_INBOUND_SIZE` so that every frame the
/// server builds from them fits within `MAX_FRAME_SIZE`.
async fn next_packet<R>(reader: &mut ReadHalf<R>, session: &Session) -> Result<Packet, AppError>
where
    R: AsyncRead,
{
    tokio::select! {
        result = read_packet_with_limit(reader, MAX_INBOUND_SIZE) => Ok(result?),
        _ = session.closed() => Err(AppError::OutputClosed),
    }
}

fn log_exit(session: &Session, err: &AppError) {
    let who = session.display_name();
    match err {
        _ if err.is_clean_close() => debug!("Client {} closed connection", who),
        AppError::OutputClosed => debug!("Output for {} closed", who),
        AppError::Frame(FrameError::TruncatedPacket) => {
            warn!("Client {} disconnected mid-frame", who)
        }
        _ => warn!("Connection error for {}: {}", who, err),
    }
}
