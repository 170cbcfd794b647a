//! Error types
//!
//! Each layer has its own error enum; [`Error`] unifies them for the
//! connection-level code paths that can fail for any of these reasons.

use std::time::Duration;

use thiserror::Error;

pub use crate::hub::CapacityError;
pub use crate::registry::{AuthError, ConflictError};
pub use crate::store::StoreError;

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Read or write failure on a connection
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// RTMP handshake failure
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// AMF encoding/decoding failure
    #[error("amf error: {0}")]
    Amf(#[from] AmfError),

    /// RTMP framing or command failure
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Malformed media payload
    #[error("media error: {0}")]
    Media(#[from] MediaError),

    /// Publisher presented an unknown name or a bad key
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Stream name already has an active publisher
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// No data received within the idle timeout
    #[error("connection idle for {0:?}")]
    IdleTimeout(Duration),

    /// Metadata store failure outside of authentication
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Publisher was refused (bad credentials or name already live)
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::Conflict(_))
    }
}

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Handshake errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Peer requested an RTMP version we cannot speak
    #[error("unsupported rtmp version {0}")]
    InvalidVersion(u8),

    /// Handshake did not complete within the connection timeout
    #[error("handshake timed out")]
    Timeout,
}

/// AMF0 errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmfError {
    #[error("unexpected end of amf data")]
    UnexpectedEof,
    #[error("unknown amf0 marker 0x{0:02x}")]
    UnknownMarker(u8),
    #[error("invalid utf-8 in amf string")]
    InvalidUtf8,
    #[error("invalid object end marker")]
    InvalidObjectEnd,
    #[error("invalid reference index {0}")]
    InvalidReference(u16),
    #[error("amf nesting too deep")]
    NestingTooDeep,
}

/// RTMP chunk stream and message errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message of {0} bytes exceeds limit")]
    MessageTooLarge(u32),
    #[error("chunk for stream {0} continues a message that was never started")]
    MissingChunkHeader(u32),
    #[error("invalid chunk size {0}")]
    InvalidChunkSize(u32),
    #[error("malformed {0} message")]
    MalformedMessage(&'static str),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("publish before connect")]
    NotConnected,
}

/// Media payload errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("invalid avc packet")]
    InvalidAvcPacket,
    #[error("invalid aac packet")]
    InvalidAacPacket,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
    #[error("duplicate stream name {0:?}")]
    DuplicateStream(String),
    #[error("{0} must be greater than zero")]
    InvalidValue(&'static str),
}
