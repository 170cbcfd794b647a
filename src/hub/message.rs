//! Inbound message envelope

use std::net::SocketAddr;

use bytes::Bytes;

/// Opaque payload plus where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub data: Bytes,
    /// `None` for events generated inside the process
    pub origin: Option<SocketAddr>,
}

impl Message {
    pub fn new(data: impl Into<Bytes>, origin: SocketAddr) -> Self {
        Self {
            data: data.into(),
            origin: Some(origin),
        }
    }

    pub fn internal(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            origin: None,
        }
    }
}
