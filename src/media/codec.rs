//! Codec parameters captured from a publish
//!
//! One entry per elementary stream, taken from the first sequence header
//! (or first frame, for codecs without one). Encoder metadata comes from
//! `onMetaData`.

use bytes::Bytes;
use serde::Serialize;

use crate::amf::AmfValue;
use crate::error::MediaError;
use crate::media::aac::AudioSpecificConfig;
use crate::media::flv::{AudioFormat, AudioTagHeader, VideoCodec, VideoTagHeader};
use crate::media::h264::AvcConfig;

/// Negotiated parameters of one elementary stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CodecParams {
    Video(VideoParams),
    Audio(AudioParams),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParams {
    pub codec: VideoCodec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParams {
    pub codec: AudioFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub sample_rate: u32,
    pub channels: u8,
}

impl CodecParams {
    /// Codec parameters announced by a video message, if any
    ///
    /// AVC only announces them in its sequence header; other codecs are
    /// identified from the first frame.
    pub fn from_video(data: &Bytes) -> Result<Option<Self>, MediaError> {
        let Some(header) = VideoTagHeader::parse(data) else {
            return Ok(None);
        };
        let Some(codec) = header.codec else {
            return Ok(None);
        };

        let params = match codec {
            VideoCodec::Avc if header.sequence_header => {
                let body = data.slice(header.body_offset().min(data.len())..);
                let config = AvcConfig::parse(body)?;
                VideoParams {
                    codec,
                    profile: Some(config.profile_name().to_string()),
                    level: Some(config.level_string()),
                }
            }
            VideoCodec::Avc => return Ok(None),
            codec => VideoParams {
                codec,
                profile: None,
                level: None,
            },
        };

        Ok(Some(CodecParams::Video(params)))
    }

    /// Codec parameters announced by an audio message, if any
    pub fn from_audio(data: &Bytes) -> Result<Option<Self>, MediaError> {
        let Some(header) = AudioTagHeader::parse(data) else {
            return Ok(None);
        };

        let params = match header.format {
            AudioFormat::Aac if header.sequence_header => {
                let config = AudioSpecificConfig::parse(&data.slice(header.body_offset()..))?;
                AudioParams {
                    codec: AudioFormat::Aac,
                    profile: Some(config.profile_name().to_string()),
                    sample_rate: config.sampling_frequency,
                    channels: config.channels(),
                }
            }
            AudioFormat::Aac => return Ok(None),
            format => AudioParams {
                codec: format,
                profile: None,
                sample_rate: header.sample_rate,
                channels: if header.stereo { 2 } else { 1 },
            },
        };

        Ok(Some(CodecParams::Audio(params)))
    }

    pub fn is_video(&self) -> bool {
        matches!(self, CodecParams::Video(_))
    }
}

/// Insert or replace the entry for the same kind of stream, keeping
/// first-seen order
pub fn merge_codec_params(existing: &mut Vec<CodecParams>, incoming: Vec<CodecParams>) {
    for params in incoming {
        match existing
            .iter_mut()
            .find(|p| p.is_video() == params.is_video())
        {
            Some(slot) => *slot = params,
            None => existing.push(params),
        }
    }
}

/// Encoder-reported stream properties from `onMetaData`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_bitrate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<String>,
}

impl StreamMetadata {
    pub fn from_amf(value: &AmfValue) -> Self {
        let number = |key: &str| value.get_number(key).filter(|n| n.is_finite() && *n > 0.0);

        Self {
            width: number("width").map(|n| n as u32),
            height: number("height").map(|n| n as u32),
            frame_rate: number("framerate").or_else(|| number("videoframerate")),
            video_bitrate: number("videodatarate"),
            audio_bitrate: number("audiodatarate"),
            encoder: value.get_string("encoder").map(str::to_string),
        }
    }
}
