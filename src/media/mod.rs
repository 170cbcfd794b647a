//! Media inspection
//!
//! Payloads are never decoded or re-encoded. Only the FLV tag header and
//! the AVC/AAC sequence headers are read, to describe what a publisher is
//! sending.

pub mod aac;
pub mod codec;
pub mod flv;
pub mod h264;

pub use aac::AudioSpecificConfig;
pub use codec::{merge_codec_params, AudioParams, CodecParams, StreamMetadata, VideoParams};
pub use flv::{AudioFormat, AudioTagHeader, VideoCodec, VideoTagHeader};
pub use h264::AvcConfig;
