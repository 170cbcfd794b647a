//! AMF0 (Action Message Format) support
//!
//! RTMP publishers send their commands (`connect`, `publish`, ...) and
//! stream metadata (`@setDataFrame`) as AMF0 value sequences. Only AMF0 is
//! implemented; AMF3 command messages are handled by the protocol layer,
//! which strips the leading format byte and decodes the rest as AMF0.

pub mod amf0;
pub mod value;

pub use amf0::{decode_all, encode_all, Amf0Decoder, Amf0Encoder};
pub use value::AmfValue;
