//! Server side of the RTMP handshake
//!
//! ```text
//! Publisher                               Server
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes) -------------->|
//!   |<------ S0 + S1 + S2 ------------------|
//!   |------- C2 (1536 bytes: echo S1) ----->|
//!   |          [Handshake Complete]          |
//! ```
//!
//! Only the simple handshake is implemented. Encoders that attempt the
//! digest handshake fall back to it because S1 carries a zero version field.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::HandshakeError;
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Waiting for C0 + C1
    WaitingForC0C1,
    /// S0S1S2 sent, waiting for C2
    WaitingForC2,
    Done,
}

/// Server handshake state machine
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::WaitingForC0C1,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// Bytes that must be buffered before the next transition
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            HandshakeState::WaitingForC0C1 => 1 + HANDSHAKE_SIZE,
            HandshakeState::WaitingForC2 => HANDSHAKE_SIZE,
            HandshakeState::Done => 0,
        }
    }

    /// Consume handshake bytes from `buf`
    ///
    /// Returns S0S1S2 once C0C1 is available. Bytes following C2 are left in
    /// `buf`; ffmpeg sends its `connect` command in the same segment.
    pub fn process(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, HandshakeError> {
        if buf.len() < self.bytes_needed() {
            return Ok(None);
        }

        match self.state {
            HandshakeState::WaitingForC0C1 => {
                let version = buf.get_u8();
                // Some encoders send versions above 3; anything below is
                // an encrypted or unknown variant.
                if version < RTMP_VERSION {
                    return Err(HandshakeError::InvalidVersion(version));
                }

                let c1 = buf.split_to(HANDSHAKE_SIZE);

                let mut response = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);
                response.put_u8(RTMP_VERSION);
                response.put_slice(&generate_s1());
                response.put_slice(&generate_echo(&c1));

                self.state = HandshakeState::WaitingForC2;
                Ok(Some(response.freeze()))
            }
            HandshakeState::WaitingForC2 => {
                // C2 should echo S1; encoders get this wrong often enough
                // that it is not verified.
                buf.advance(HANDSHAKE_SIZE);
                self.state = HandshakeState::Done;
                Ok(None)
            }
            HandshakeState::Done => Ok(None),
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// S1: timestamp, zero field, random fill
fn generate_s1() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    packet[0..4].copy_from_slice(&now_millis().to_be_bytes());
    rand::thread_rng().fill_bytes(&mut packet[8..]);
    packet
}

/// S2: the peer's C1 with our receive time in bytes 4..8
fn generate_echo(peer_packet: &[u8]) -> [u8; HANDSHAKE_SIZE] {
    let mut echo = [0u8; HANDSHAKE_SIZE];
    echo.copy_from_slice(&peer_packet[..HANDSHAKE_SIZE]);
    echo[4..8].copy_from_slice(&now_millis().to_be_bytes());
    echo
}
