//! Error types for the chat relay
//!
//! Defines framing errors raised by the codec and session-level errors
//! raised while driving a connection. Uses thiserror for ergonomic error
//! definitions.

use thiserror::Error;

/// Framing errors
///
/// Produced by `codec::read_packet` when a frame cannot be read in full.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Peer ended the stream at a frame boundary (normal disconnect)
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Peer ended the stream in the middle of a frame
    #[error("Truncated packet")]
    TruncatedPacket,

    /// Declared body length exceeds the frame size limit
    #[error("Frame too large: {length} bytes (max {max})")]
    FrameTooLarge { length: u32, max: u32 },

    /// Body too long for the u32 length field
    #[error("Body too long to encode: {length} bytes")]
    BodyTooLong { length: usize },

    /// IO error other than end-of-input
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-level errors
///
/// Any of these ends the session; none of them escape the connection task.
#[derive(Debug, Error)]
pub enum AppError {
    /// Reading the next frame failed
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// First packet was not REGISTER_NAME
    #[error("Initial packet was not REGISTER_NAME")]
    NameRequired,

    /// REGISTER_NAME body was blank
    #[error("Name not registered")]
    EmptyName,

    /// Output was closed after a failed send
    #[error("Output closed")]
    OutputClosed,
}

impl AppError {
    /// SERVER_INFO text sent to the client before a protocol rejection
    ///
    /// Returns None for errors that end the session silently.
    pub fn rejection_notice(&self) -> Option<&'static str> {
        match self {
            AppError::NameRequired => Some("Server: Enter your name first."),
            AppError::EmptyName => Some("Server: You must enter a name."),
            _ => None,
        }
    }

    /// Whether this error is the peer closing the stream cleanly
    pub fn is_clean_close(&self) -> bool {
        matches!(self, AppError::Frame(FrameError::ConnectionClosed))
    }
}
