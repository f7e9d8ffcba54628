//! Session struct definition
//!
//! Represents one connected client: its id, registered name, counters and
//! guarded output stream. The connection task owns the read side; the
//! output is shared with every other session's broadcast through `send`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::types::{ClientId, SessionStats};

/// Boxed write half of a client connection
pub type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// Server-side state for one connected client
///
/// The output mutex is the per-session lock: it guards socket writes and
/// the received-counter increment, and nothing else. It is always acquired
/// after (never while holding) the registry lock.
pub struct Session {
    /// Unique identifier, fixed at accept time
    id: ClientId,
    /// Display name (unset until registration, then immutable)
    name: OnceLock<String>,
    /// Chat messages this client has relayed
    sent: AtomicU64,
    /// Packets successfully written to this client
    received: AtomicU64,
    /// Write half; None once closed
    output: Mutex<Option<Output>>,
    /// Wakes the connection task when the output is closed
    shutdown: Notify,
}

impl Session {
    /// Create a new unnamed session writing to `output`
    pub fn new<W>(id: ClientId, output: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            name: OnceLock::new(),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            output: Mutex::new(Some(Box::new(output))),
            shutdown: Notify::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Registered name, if registration has completed
    pub fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    /// Name if registered, otherwise the id
    pub fn display_name(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => self.id.to_string(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.name.get().is_some()
    }

    /// Record the display name
    ///
    /// Returns false if a name was already set; the first name wins.
    pub fn set_name(&self, name: String) -> bool {
        self.name.set(name).is_ok()
    }

    /// Count one chat message relayed on behalf of this client
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
        }
    }

    /// Write an encoded frame to this client
    ///
    /// Never fails from the caller's point of view: a write error is logged,
    /// the output is closed and the connection task is woken to terminate.
    /// Sends to an already closed session are dropped.
    pub async fn send(&self, frame: &[u8]) {
        let mut output = self.output.lock().await;
        let Some(writer) = output.as_mut() else {
            return;
        };

        match write_frame(writer, frame).await {
            Ok(()) => {
                self.received.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(
                    "Failed to send packet to {}: {}. Disconnecting...",
                    self.display_name(),
                    e
                );
                if let Some(mut writer) = output.take() {
                    let _ = writer.shutdown().await;
                }
                self.shutdown.notify_one();
            }
        }
    }

    /// Close the output stream
    ///
    /// Returns true if this call closed it, false if it was already closed.
    pub async fn close(&self) -> bool {
        let mut output = self.output.lock().await;
        let Some(mut writer) = output.take() else {
            return false;
        };
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown error for {}: {}", self.id, e);
        }
        self.shutdown.notify_one();
        true
    }

    /// Resolves once the output has been closed
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name.get())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

async fn write_frame(writer: &mut Output, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}
