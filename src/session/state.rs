//! Publish session state machine
//!
//! ```text
//! Connecting ──publish──► Authenticating ──ok──► Publishing ──► Closed
//!                               │
//!                               └──auth/conflict──► Rejected
//! ```
//!
//! `Rejected` and `Closed` are terminal. A connection may unpublish and
//! publish again, which starts a new [`Session`] from `Connecting`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::protocol::message::ConnectParams;
use crate::protocol::quirks::EncoderType;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one authenticated publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof that a publisher passed authentication for a stream name
///
/// Handed to `open_session` / `close_owned`; only the holder of the token
/// that opened a stream can update or close it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    stream_name: String,
    peer_addr: Option<SocketAddr>,
    display_name: Option<String>,
    is_public: bool,
}

impl Session {
    pub(crate) fn new(stream_name: String) -> Self {
        Self {
            id: SessionId::next(),
            stream_name,
            peer_addr: None,
            display_name: None,
            is_public: true,
        }
    }

    /// Directory details copied from the stream's record
    pub(crate) fn with_listing(mut self, display_name: Option<String>, is_public: bool) -> Self {
        self.display_name = display_name;
        self.is_public = is_public;
        self
    }

    pub fn with_peer(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Listed by the live directory
    pub fn is_public(&self) -> bool {
        self.is_public
    }
}

/// Publish lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Connection accepted, no stream name yet
    Connecting,
    /// Stream name received, key being checked
    Authenticating,
    Publishing,
    /// Bad credentials or name already taken
    Rejected,
    /// Unpublished, disconnected, failed or idle
    Closed,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Rejected | SessionPhase::Closed)
    }
}

/// Per-connection state
#[derive(Debug)]
pub struct SessionState {
    /// Connection ID assigned by the listener
    pub connection_id: u64,

    pub peer_addr: SocketAddr,

    pub phase: SessionPhase,

    pub connected_at: Instant,

    /// Set by `connect`
    pub connect_params: Option<ConnectParams>,

    pub encoder_type: EncoderType,

    /// Stream name presented by `publish`
    pub stream_name: Option<String>,

    /// Registry token while publishing
    pub session: Option<Session>,

    /// Window acknowledgement size announced by the server
    pub window_ack_size: u32,

    pub bytes_received: u64,

    last_ack_sequence: u64,
}

impl SessionState {
    pub fn new(connection_id: u64, peer_addr: SocketAddr, window_ack_size: u32) -> Self {
        Self {
            connection_id,
            peer_addr,
            phase: SessionPhase::Connecting,
            connected_at: Instant::now(),
            connect_params: None,
            encoder_type: EncoderType::Unknown,
            stream_name: None,
            session: None,
            window_ack_size,
            bytes_received: 0,
            last_ack_sequence: 0,
        }
    }

    pub fn on_connect(&mut self, params: ConnectParams) {
        self.encoder_type = EncoderType::from_flash_ver(&params.flash_ver);
        self.connect_params = Some(params);
    }

    pub fn is_connected(&self) -> bool {
        self.connect_params.is_some()
    }

    /// `publish` received; only valid from `Connecting` or after a clean unpublish
    pub fn begin_auth(&mut self, stream_name: &str) -> bool {
        match self.phase {
            SessionPhase::Connecting | SessionPhase::Closed if self.session.is_none() => {
                self.phase = SessionPhase::Authenticating;
                self.stream_name = Some(stream_name.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn on_published(&mut self, session: Session) {
        if self.phase == SessionPhase::Authenticating {
            self.phase = SessionPhase::Publishing;
            self.session = Some(session);
        }
    }

    pub fn on_rejected(&mut self) {
        if self.phase == SessionPhase::Authenticating {
            self.phase = SessionPhase::Rejected;
        }
    }

    /// Leave `Publishing`, returning the token to release
    pub fn close(&mut self) -> Option<Session> {
        if !self.phase.is_terminal() {
            self.phase = SessionPhase::Closed;
        }
        self.session.take()
    }

    pub fn is_publishing(&self) -> bool {
        self.phase == SessionPhase::Publishing
    }

    /// Count received bytes; true when an acknowledgement is due
    pub fn add_bytes_received(&mut self, bytes: u64) -> bool {
        self.bytes_received += bytes;
        self.window_ack_size > 0
            && self.bytes_received - self.last_ack_sequence >= self.window_ack_size as u64
    }

    /// Sequence number for the acknowledgement (wraps at 32 bits)
    pub fn mark_ack_sent(&mut self) -> u32 {
        self.last_ack_sequence = self.bytes_received;
        self.bytes_received as u32
    }

    pub fn app(&self) -> Option<&str> {
        self.connect_params.as_ref().map(|p| p.app.as_str())
    }
}
