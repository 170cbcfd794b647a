//! RTMP protocol constants

/// Handshake packet size (C1/C2/S1/S2)
pub const HANDSHAKE_SIZE: usize = 1536;

/// Plain RTMP version byte (C0/S0)
pub const RTMP_VERSION: u8 = 3;

/// Chunk size both sides start with
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size the server switches to after connect
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;

/// Largest chunk size the protocol allows (31 bits)
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

/// Upper bound for a reassembled message
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;
pub const DEFAULT_PEER_BANDWIDTH: u32 = 2_500_000;

/// Timestamps at or above this value are carried in the extended field
pub const EXTENDED_TIMESTAMP: u32 = 0xFF_FFFF;

// Chunk stream IDs used for outgoing messages
pub const CSID_PROTOCOL_CONTROL: u32 = 2;
pub const CSID_COMMAND: u32 = 3;
pub const CSID_AUDIO: u32 = 4;
pub const CSID_VIDEO: u32 = 6;
pub const CSID_DATA: u32 = 5;

// Message type IDs
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF3: u8 = 15;
pub const MSG_COMMAND_AMF3: u8 = 17;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event types
pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_STREAM_EOF: u16 = 1;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

/// Message stream ID handed out by `createStream`
pub const PUBLISH_STREAM_ID: u32 = 1;

/// Peer bandwidth limit type "dynamic"
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;
