//! RTMP protocol layer
//!
//! Handshake, chunk stream framing and message parsing. Nothing here does
//! I/O; the connection handler feeds bytes in and writes bytes out.

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;
pub mod quirks;

pub use chunk::{ChunkDecoder, ChunkEncoder, OutgoingMessage, RawMessage};
pub use handshake::Handshake;
pub use message::{Command, ConnectParams, DataMessage, PublishParams, RtmpMessage, UserControlEvent};
pub use quirks::EncoderType;
