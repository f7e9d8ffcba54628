//! Packet definitions
//!
//! A packet is one length-prefixed frame: an 8-byte header
//! `[body length: u32][type: u32]` (big-endian) followed by the body.
//! Bodies are UTF-8 text for every known packet type.

use std::borrow::Cow;
use std::fmt;

/// Known packet types with their wire-stable codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Client → Server: register a display name (first packet only)
    RegisterName,
    /// Both directions: chat text
    ChatMessage,
    /// Server → Client: informational notice
    ServerInfo,
    /// Server → Client: a peer left, with its statistics
    DisconnectInfo,
    /// Client → Server: graceful disconnect
    DisconnectRequest,
}

impl PacketType {
    /// Wire code for this packet type
    pub const fn code(self) -> u32 {
        match self {
            PacketType::RegisterName => 1,
            PacketType::ChatMessage => 2,
            PacketType::ServerInfo => 3,
            PacketType::DisconnectInfo => 4,
            PacketType::DisconnectRequest => 5,
        }
    }

    /// Classify a wire code; unknown codes yield None
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(PacketType::RegisterName),
            2 => Some(PacketType::ChatMessage),
            3 => Some(PacketType::ServerInfo),
            4 => Some(PacketType::DisconnectInfo),
            5 => Some(PacketType::DisconnectRequest),
            _ => None,
        }
    }
}

impl From<PacketType> for u32 {
    fn from(kind: PacketType) -> Self {
        kind.code()
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::RegisterName => "REGISTER_NAME",
            PacketType::ChatMessage => "CHAT_MESSAGE",
            PacketType::ServerInfo => "SERVER_INFO",
            PacketType::DisconnectInfo => "DISCONNECT_INFO",
            PacketType::DisconnectRequest => "DISCONNECT_REQUEST",
        };
        f.write_str(name)
    }
}

/// A decoded packet
///
/// Holds the raw type code so unknown types survive decoding and can be
/// classified by the caller. The body length always equals the header's
/// declared length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    kind: u32,
    body: Vec<u8>,
}

impl Packet {
    pub fn new(kind: u32, body: Vec<u8>) -> Self {
        Self { kind, body }
    }

    /// Raw type code as seen on the wire
    pub fn kind(&self) -> u32 {
        self.kind
    }

    /// Known packet type, if the code is recognized
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_code(self.kind)
    }

    /// Body length in bytes
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
