//! AMF0 encoder and decoder
//!
//! Type markers handled:
//! ```text
//! 0x00 Number      0x01 Boolean     0x02 String      0x03 Object
//! 0x05 Null        0x06 Undefined   0x08 ECMA Array  0x09 Object End
//! 0x0A Strict Array 0x0B Date       0x0C Long String 0x0D Unsupported
//! ```
//!
//! The decoder is lenient by default: OBS and some hardware encoders omit
//! the object end marker at the tail of a command, and unknown markers are
//! read as `Undefined` instead of failing the whole command.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::AmfValue;
use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;

/// Maximum nesting depth for objects/arrays
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder
pub struct Amf0Decoder {
    lenient: bool,
    depth: usize,
}

impl Amf0Decoder {
    pub fn new() -> Self {
        Self::with_lenient(true)
    }

    pub fn with_lenient(lenient: bool) -> Self {
        Self { lenient, depth: 0 }
    }

    /// Decode a single value
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if !buf.has_remaining() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_marker(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode values until the buffer is exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_marker(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => {
                ensure(buf, 8)?;
                Ok(AmfValue::Number(buf.get_f64()))
            }
            MARKER_BOOLEAN => {
                ensure(buf, 1)?;
                Ok(AmfValue::Boolean(buf.get_u8() != 0))
            }
            MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            MARKER_LONG_STRING => Ok(AmfValue::String(read_utf8_long(buf)?)),
            MARKER_OBJECT => Ok(AmfValue::Object(self.read_properties(buf)?)),
            MARKER_ECMA_ARRAY => {
                ensure(buf, 4)?;
                // Count is only a hint; the end marker terminates the array
                let _count = buf.get_u32();
                Ok(AmfValue::EcmaArray(self.read_properties(buf)?))
            }
            MARKER_STRICT_ARRAY => {
                ensure(buf, 4)?;
                let count = buf.get_u32() as usize;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.decode(buf)?);
                }
                Ok(AmfValue::Array(items))
            }
            MARKER_DATE => {
                ensure(buf, 10)?;
                let millis = buf.get_f64();
                let _timezone = buf.get_i16();
                Ok(AmfValue::Date(millis))
            }
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED | MARKER_UNSUPPORTED => Ok(AmfValue::Undefined),
            other if self.lenient => {
                tracing::trace!(marker = other, "Skipping unknown AMF0 marker");
                Ok(AmfValue::Undefined)
            }
            other => Err(AmfError::UnknownMarker(other)),
        }
    }

    fn read_properties(&mut self, buf: &mut Bytes) -> Result<Vec<(String, AmfValue)>, AmfError> {
        let mut props = Vec::new();

        loop {
            if self.lenient && buf.remaining() < 2 {
                // Truncated tail: treat as end of object
                break;
            }

            let key = read_utf8(buf)?;
            if key.is_empty() {
                if !buf.has_remaining() {
                    if self.lenient {
                        break;
                    }
                    return Err(AmfError::UnexpectedEof);
                }
                if buf.chunk()[0] == MARKER_OBJECT_END {
                    buf.advance(1);
                } else if !self.lenient {
                    return Err(AmfError::InvalidObjectEnd);
                }
                break;
            }

            let value = self.decode(buf)?;
            props.push((key, value));
        }

        Ok(props)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Take the encoded bytes, leaving the encoder empty
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Null => self.buf.put_u8(MARKER_NULL),
            AmfValue::Undefined => self.buf.put_u8(MARKER_UNDEFINED),
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::String(s) if s.len() > u16::MAX as usize => {
                self.buf.put_u8(MARKER_LONG_STRING);
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::String(s) => {
                self.buf.put_u8(MARKER_STRING);
                self.write_key(s);
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.write_properties(props);
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                self.write_properties(props);
            }
            AmfValue::Array(items) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(items.len() as u32);
                for item in items {
                    self.encode(item);
                }
            }
            AmfValue::Date(millis) => {
                self.buf.put_u8(MARKER_DATE);
                self.buf.put_f64(*millis);
                self.buf.put_i16(0);
            }
        }
    }

    fn write_properties(&mut self, props: &[(String, AmfValue)]) {
        for (key, value) in props {
            self.write_key(key);
            self.encode(value);
        }
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }

    /// UTF-8 string with a 16-bit length prefix and no marker
    fn write_key(&mut self, s: &str) {
        let len = s.len().min(u16::MAX as usize);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a sequence of values
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    for value in values {
        encoder.encode(value);
    }
    encoder.finish()
}

/// Decode every value in `data` using the lenient decoder
pub fn decode_all(data: Bytes) -> Result<Vec<AmfValue>, AmfError> {
    let mut buf = data;
    Amf0Decoder::new().decode_all(&mut buf)
}

fn ensure(buf: &Bytes, n: usize) -> Result<(), AmfError> {
    if buf.remaining() < n {
        Err(AmfError::UnexpectedEof)
    } else {
        Ok(())
    }
}

fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    read_utf8_bytes(buf, len)
}

fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    ensure(buf, 4)?;
    let len = buf.get_u32() as usize;
    read_utf8_bytes(buf, len)
}

fn read_utf8_bytes(buf: &mut Bytes, len: usize) -> Result<String, AmfError> {
    ensure(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}
