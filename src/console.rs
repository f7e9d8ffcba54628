//! Console client helpers
//!
//! Maps typed lines to outgoing packets and incoming packets to printable
//! lines for the interactive client.

use crate::message::{Packet, PacketType};

/// Command that ends the client session
pub const EXIT_COMMAND: &str = "/exit";

/// What a typed line asks the client to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Send DISCONNECT_REQUEST and quit
    Exit,
    /// Send the line as a CHAT_MESSAGE
    Chat(String),
}

impl ConsoleInput {
    /// Parse a typed line; blank lines yield None
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case(EXIT_COMMAND) {
            Some(ConsoleInput::Exit)
        } else if trimmed.is_empty() {
            None
        } else {
            Some(ConsoleInput::Chat(line.trim_end_matches(['\r', '\n']).to_string()))
        }
    }
}

/// Format an incoming packet for display
pub fn render(packet: &Packet) -> String {
    let text = packet.text();
    match packet.packet_type() {
        Some(PacketType::ChatMessage) => text.into_owned(),
        Some(PacketType::ServerInfo) => format!("[INFO] {}", text),
        Some(PacketType::DisconnectInfo) => format!("[LEAVE] {}", text),
        _ => format!("[UNKNOWN] {}", text),
    }
}
