//! FLV tag headers
//!
//! RTMP audio and video messages carry the body of an FLV tag. The first
//! byte describes the codec; for AVC and AAC a second byte says whether the
//! payload is a sequence header or a frame.
//!
//! ```text
//! video: FrameType(4) CodecID(4) [AVCPacketType(1) CompositionTime(3)]
//! audio: SoundFormat(4) SoundRate(2) SoundSize(1) SoundType(1) [AACPacketType(1)]
//! ```

use serde::Serialize;

/// Video codec ID (lower 4 bits of the first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H263,
    ScreenVideo,
    Vp6,
    Vp6Alpha,
    ScreenVideoV2,
    Avc,
    Hevc,
    Av1,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::H263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            13 => Some(VideoCodec::Av1),
            _ => None,
        }
    }
}

/// Audio format (upper 4 bits of the first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Pcm,
    Adpcm,
    Mp3,
    PcmLe,
    Nellymoser,
    G711Alaw,
    G711Mulaw,
    Aac,
    Speex,
    Other,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Self {
        match b >> 4 {
            0 => AudioFormat::Pcm,
            1 => AudioFormat::Adpcm,
            2 | 14 => AudioFormat::Mp3,
            3 => AudioFormat::PcmLe,
            4..=6 => AudioFormat::Nellymoser,
            7 => AudioFormat::G711Alaw,
            8 => AudioFormat::G711Mulaw,
            10 => AudioFormat::Aac,
            11 => AudioFormat::Speex,
            _ => AudioFormat::Other,
        }
    }
}

/// Classified video message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTagHeader {
    pub codec: Option<VideoCodec>,
    pub keyframe: bool,
    /// AVC packet type 0 (AVCDecoderConfigurationRecord follows)
    pub sequence_header: bool,
}

impl VideoTagHeader {
    /// Returns `None` for an empty payload
    pub fn parse(data: &[u8]) -> Option<Self> {
        let first = *data.first()?;
        let codec = VideoCodec::from_byte(first);
        // Frame types 1 (key) and 4 (generated key)
        let keyframe = matches!(first >> 4, 1 | 4);
        let sequence_header =
            matches!(codec, Some(VideoCodec::Avc)) && data.get(1).copied() == Some(0);

        Some(Self {
            codec,
            keyframe,
            sequence_header,
        })
    }

    /// Offset of the codec payload after the tag header
    pub fn body_offset(&self) -> usize {
        match self.codec {
            Some(VideoCodec::Avc) => 5,
            _ => 1,
        }
    }
}

/// Classified audio message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTagHeader {
    pub format: AudioFormat,
    /// Nominal rate from the FLV header; AAC carries the real one in its config
    pub sample_rate: u32,
    pub stereo: bool,
    /// AAC packet type 0 (AudioSpecificConfig follows)
    pub sequence_header: bool,
}

impl AudioTagHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        let first = *data.first()?;
        let format = AudioFormat::from_byte(first);
        let sample_rate = match (first >> 2) & 0x03 {
            0 => 5512,
            1 => 11025,
            2 => 22050,
            _ => 44100,
        };
        let sequence_header = format == AudioFormat::Aac && data.get(1).copied() == Some(0);

        Some(Self {
            format,
            sample_rate,
            stereo: first & 0x01 != 0,
            sequence_header,
        })
    }

    pub fn body_offset(&self) -> usize {
        match self.format {
            AudioFormat::Aac => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_header() {
        let seq = VideoTagHeader::parse(&[0x17, 0x00, 0, 0, 0]).unwrap();
        assert_eq!(seq.codec, Some(VideoCodec::Avc));
        assert!(seq.keyframe);
        assert!(seq.sequence_header);
        assert_eq!(seq.body_offset(), 5);

        let inter = VideoTagHeader::parse(&[0x27, 0x01, 0, 0, 0]).unwrap();
        assert!(!inter.keyframe);
        assert!(!inter.sequence_header);

        assert!(VideoTagHeader::parse(&[]).is_none());
    }

    #[test]
    fn test_audio_header() {
        // AAC, 44.1 kHz, 16 bit, stereo
        let seq = AudioTagHeader::parse(&[0xAF, 0x00, 0x12, 0x10]).unwrap();
        assert_eq!(seq.format, AudioFormat::Aac);
        assert_eq!(seq.sample_rate, 44100);
        assert!(seq.stereo);
        assert!(seq.sequence_header);

        let mp3 = AudioTagHeader::parse(&[0x2E]).unwrap();
        assert_eq!(mp3.format, AudioFormat::Mp3);
        assert_eq!(mp3.sample_rate, 44100);
        assert!(!mp3.stereo);
        assert!(!mp3.sequence_header);
    }
}
