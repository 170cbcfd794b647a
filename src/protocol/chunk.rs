//! RTMP chunk stream framing
//!
//! Messages are split into chunks of at most `chunk_size` payload bytes.
//! Each chunk starts with a basic header (format + chunk stream ID) and a
//! message header whose size depends on the format:
//!
//! ```text
//! fmt 0: timestamp(3) length(3) type(1) stream_id(4, LE)   new message
//! fmt 1: ts_delta(3)  length(3) type(1)                    same stream
//! fmt 2: ts_delta(3)                                       same length/type
//! fmt 3: (none)                                            continuation
//! ```
//!
//! A timestamp field of 0xFFFFFF means a 4-byte extended timestamp follows.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::constants::{
    DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP, MAX_CHUNK_SIZE, MAX_MESSAGE_SIZE,
};

/// A reassembled message before type-specific parsing
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub csid: u32,
    pub timestamp: u32,
    pub type_id: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

/// Per chunk stream header state
#[derive(Debug, Default)]
struct ChunkStream {
    timestamp: u32,
    timestamp_delta: u32,
    length: u32,
    type_id: u8,
    stream_id: u32,
    extended: bool,
    payload: BytesMut,
}

/// Incremental chunk decoder
#[derive(Debug)]
pub struct ChunkDecoder {
    chunk_size: u32,
    streams: HashMap<u32, ChunkStream>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Apply a peer's Set Chunk Size message
    pub fn set_chunk_size(&mut self, size: u32) -> Result<(), ProtocolError> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ProtocolError::InvalidChunkSize(size));
        }
        self.chunk_size = size;
        Ok(())
    }

    /// Discard a partially received message (Abort message)
    pub fn abort(&mut self, csid: u32) {
        if let Some(stream) = self.streams.get_mut(&csid) {
            stream.payload.clear();
        }
    }

    /// Decode one chunk from `buf`
    ///
    /// Returns `Ok(None)` when `buf` does not hold a complete chunk (nothing
    /// is consumed in that case) or when the chunk did not finish a message.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RawMessage>, ProtocolError> {
        let Some(header) = self.peek_header(buf)? else {
            return Ok(None);
        };

        buf.advance(header.header_len);
        let chunk_size = self.chunk_size as usize;
        let stream = self.streams.entry(header.csid).or_default();

        let starting = stream.payload.is_empty();
        match header.fmt {
            0 => {
                stream.timestamp = header.timestamp;
                stream.timestamp_delta = 0;
                stream.length = header.length;
                stream.type_id = header.type_id;
                stream.stream_id = header.stream_id;
            }
            1 => {
                stream.timestamp_delta = header.timestamp;
                stream.timestamp = stream.timestamp.wrapping_add(header.timestamp);
                stream.length = header.length;
                stream.type_id = header.type_id;
            }
            2 => {
                stream.timestamp_delta = header.timestamp;
                stream.timestamp = stream.timestamp.wrapping_add(header.timestamp);
            }
            _ => {
                if starting {
                    stream.timestamp = stream.timestamp.wrapping_add(stream.timestamp_delta);
                }
            }
        }
        if header.fmt != 3 {
            stream.extended = header.extended;
            if !starting {
                // A new header mid-message replaces the unfinished message
                stream.payload.clear();
            }
        }

        let remaining = stream.length as usize - stream.payload.len();
        let take = remaining.min(chunk_size);
        stream.payload.extend_from_slice(&buf[..take]);
        buf.advance(take);

        if stream.payload.len() < stream.length as usize {
            return Ok(None);
        }

        Ok(Some(RawMessage {
            csid: header.csid,
            timestamp: stream.timestamp,
            type_id: stream.type_id,
            stream_id: stream.stream_id,
            payload: stream.payload.split().freeze(),
        }))
    }

    /// Parse a chunk header without consuming anything
    fn peek_header(&self, buf: &[u8]) -> Result<Option<ChunkHeader>, ProtocolError> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        let fmt = first >> 6;
        let (csid, mut pos) = match first & 0x3F {
            0 => match buf.get(1) {
                Some(&b) => (b as u32 + 64, 2),
                None => return Ok(None),
            },
            1 => match (buf.get(1), buf.get(2)) {
                (Some(&b1), Some(&b2)) => (b1 as u32 + (b2 as u32) * 256 + 64, 3),
                _ => return Ok(None),
            },
            id => (id as u32, 1),
        };

        let header_size = [11, 7, 3, 0][fmt as usize];
        if buf.len() < pos + header_size {
            return Ok(None);
        }

        let previous = self.streams.get(&csid);
        if fmt != 0 && previous.is_none() {
            return Err(ProtocolError::MissingChunkHeader(csid));
        }

        let mut timestamp = 0;
        let mut length = previous.map(|s| s.length).unwrap_or(0);
        let mut type_id = previous.map(|s| s.type_id).unwrap_or(0);
        let mut stream_id = previous.map(|s| s.stream_id).unwrap_or(0);

        let fields = &buf[pos..pos + header_size];
        if fmt <= 2 {
            timestamp = read_u24(&fields[0..3]);
        }
        if fmt <= 1 {
            length = read_u24(&fields[3..6]);
            type_id = fields[6];
        }
        if fmt == 0 {
            stream_id = u32::from_le_bytes([fields[7], fields[8], fields[9], fields[10]]);
        }
        pos += header_size;

        let extended = if fmt == 3 {
            previous.map(|s| s.extended).unwrap_or(false)
        } else {
            timestamp >= EXTENDED_TIMESTAMP
        };
        if extended {
            if buf.len() < pos + 4 {
                return Ok(None);
            }
            let ext = u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
            if fmt != 3 {
                timestamp = ext;
            }
            pos += 4;
        }

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }

        let received = match previous {
            Some(s) if fmt == 3 => s.payload.len(),
            _ => 0,
        };
        let chunk_len = (length as usize - received.min(length as usize)).min(self.chunk_size as usize);
        if buf.len() < pos + chunk_len {
            return Ok(None);
        }

        Ok(Some(ChunkHeader {
            fmt,
            csid,
            timestamp,
            length,
            type_id,
            stream_id,
            extended,
            header_len: pos,
        }))
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct ChunkHeader {
    fmt: u8,
    csid: u32,
    timestamp: u32,
    length: u32,
    type_id: u8,
    stream_id: u32,
    extended: bool,
    header_len: usize,
}

/// Chunk encoder for outgoing messages
///
/// Every message is written with a full format 0 header followed by
/// format 3 continuation chunks.
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: u32,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Must only change after the Set Chunk Size message has been written
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    pub fn encode(&self, csid: u32, message: &OutgoingMessage<'_>, out: &mut BytesMut) {
        let extended = message.timestamp >= EXTENDED_TIMESTAMP;
        let ts_field = if extended {
            EXTENDED_TIMESTAMP
        } else {
            message.timestamp
        };

        write_basic_header(out, 0, csid);
        write_u24(out, ts_field);
        write_u24(out, message.payload.len() as u32);
        out.put_u8(message.type_id);
        out.put_u32_le(message.stream_id);
        if extended {
            out.put_u32(message.timestamp);
        }

        let mut chunks = message.payload.chunks(self.chunk_size as usize);
        if let Some(first) = chunks.next() {
            out.put_slice(first);
        }
        for chunk in chunks {
            write_basic_header(out, 3, csid);
            if extended {
                out.put_u32(message.timestamp);
            }
            out.put_slice(chunk);
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of a message to be chunked
#[derive(Debug, Clone, Copy)]
pub struct OutgoingMessage<'a> {
    pub timestamp: u32,
    pub type_id: u8,
    pub stream_id: u32,
    pub payload: &'a [u8],
}

fn write_basic_header(out: &mut BytesMut, fmt: u8, csid: u32) {
    match csid {
        2..=63 => out.put_u8((fmt << 6) | csid as u8),
        64..=319 => {
            out.put_u8(fmt << 6);
            out.put_u8((csid - 64) as u8);
        }
        _ => {
            let id = csid - 64;
            out.put_u8((fmt << 6) | 1);
            out.put_u8((id & 0xFF) as u8);
            out.put_u8((id >> 8) as u8);
        }
    }
}

fn read_u24(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32
}

fn write_u24(out: &mut BytesMut, v: u32) {
    out.put_u8((v >> 16) as u8);
    out.put_u8((v >> 8) as u8);
    out.put_u8(v as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{MSG_COMMAND_AMF0, MSG_VIDEO};

    fn encode(encoder: &ChunkEncoder, csid: u32, timestamp: u32, type_id: u8, payload: &[u8]) -> BytesMut {
        let mut out = BytesMut::new();
        encoder.encode(
            csid,
            &OutgoingMessage {
                timestamp,
                type_id,
                stream_id: 1,
                payload,
            },
            &mut out,
        );
        out
    }

    fn decode_one(decoder: &mut ChunkDecoder, buf: &mut BytesMut) -> Option<RawMessage> {
        loop {
            if buf.is_empty() {
                return None;
            }
            if let Some(msg) = decoder.decode(buf).unwrap() {
                return Some(msg);
            }
        }
    }

    #[test]
    fn test_multi_chunk_message() {
        let encoder = ChunkEncoder::new();
        let payload: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut buf = encode(&encoder, 6, 1000, MSG_VIDEO, &payload);

        // 12 byte header + 128, then 2 x (1 byte header + chunk)
        assert_eq!(buf.len(), 12 + 300 + 2);

        let mut decoder = ChunkDecoder::new();
        let msg = decode_one(&mut decoder, &mut buf).unwrap();
        assert_eq!(msg.type_id, MSG_VIDEO);
        assert_eq!(msg.timestamp, 1000);
        assert_eq!(msg.stream_id, 1);
        assert_eq!(&msg.payload[..], &payload[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_incomplete_chunk_consumes_nothing() {
        let encoder = ChunkEncoder::new();
        let full = encode(&encoder, 3, 0, MSG_COMMAND_AMF0, &[1, 2, 3, 4]);

        let mut decoder = ChunkDecoder::new();
        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(decoder.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), full.len() - 1);

        partial.put_u8(full[full.len() - 1]);
        let msg = decoder.decode(&mut partial).unwrap().unwrap();
        assert_eq!(&msg.payload[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_extended_timestamp() {
        let encoder = ChunkEncoder::new();
        let payload = vec![7u8; 200];
        let mut buf = encode(&encoder, 4, 0x0100_0000, MSG_VIDEO, &payload);

        let mut decoder = ChunkDecoder::new();
        let msg = decode_one(&mut decoder, &mut buf).unwrap();
        assert_eq!(msg.timestamp, 0x0100_0000);
        assert_eq!(msg.payload.len(), 200);
    }

    #[test]
    fn test_delta_headers() {
        let mut buf = BytesMut::new();
        // fmt 0, csid 4, ts 100, len 2, type 9, stream 1
        buf.put_slice(&[0x04, 0, 0, 100, 0, 0, 2, MSG_VIDEO, 1, 0, 0, 0, 0xAA, 0xBB]);
        // fmt 2, csid 4, delta 40
        buf.put_slice(&[0x84, 0, 0, 40, 0xCC, 0xDD]);
        // fmt 3, csid 4: reuses delta 40
        buf.put_slice(&[0xC4, 0xEE, 0xFF]);

        let mut decoder = ChunkDecoder::new();
        let first = decoder.decode(&mut buf).unwrap().unwrap();
        let second = decoder.decode(&mut buf).unwrap().unwrap();
        let third = decoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(first.timestamp, 100);
        assert_eq!(second.timestamp, 140);
        assert_eq!(&second.payload[..], &[0xCC, 0xDD]);
        assert_eq!(third.timestamp, 180);
        assert_eq!(third.stream_id, 1);
    }

    #[test]
    fn test_continuation_without_header_is_error() {
        let mut buf = BytesMut::from(&[0xC5u8, 0x00][..]);
        let mut decoder = ChunkDecoder::new();
        assert_eq!(
            decoder.decode(&mut buf),
            Err(ProtocolError::MissingChunkHeader(5))
        );
    }

    #[test]
    fn test_large_chunk_size_and_csid() {
        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(4096);
        let payload = vec![1u8; 5000];
        let mut buf = encode(&encoder, 400, 10, MSG_VIDEO, &payload);

        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(4096).unwrap();
        let msg = decode_one(&mut decoder, &mut buf).unwrap();
        assert_eq!(msg.csid, 400);
        assert_eq!(msg.payload.len(), 5000);

        assert!(decoder.set_chunk_size(0).is_err());
    }
}
