//! Error taxonomy shared by the server and the client

use std::io;

/// Errors produced while moving frames and player records over a connection
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("payload of {0} bytes does not fit the 8-digit length field")]
    PayloadTooLarge(usize),
    #[error("malformed frame length field: {0:?}")]
    Framing(String),
    #[error("schema error: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("operation timed out")]
    Timeout,
    #[error("invalid server address: {0:?}")]
    Address(String),
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl ProtocolError {
    /// Returns true when the connection that produced this error cannot be
    /// read from any further.
    ///
    /// `Framing` and `Schema` only spoil a single message; the reader keeps
    /// scanning for the next frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionClosed | ProtocolError::Timeout | ProtocolError::Io(_)
        )
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ProtocolError::ConnectionClosed,
            io::ErrorKind::TimedOut => ProtocolError::Timeout,
            _ => ProtocolError::Io(err),
        }
    }
}

impl From<tokio::time::error::Elapsed> for ProtocolError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProtocolError::Timeout
    }
}
