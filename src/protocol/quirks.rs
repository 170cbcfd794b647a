//! Encoder identification and compatibility notes
//!
//! Publishers differ in small ways the connection handler tolerates:
//!
//! - OBS sends `releaseStream` and `FCPublish` before `createStream` and
//!   wraps metadata in `@setDataFrame`.
//! - ffmpeg (`Lavf`) sends `connect` in the same segment as C2.
//! - Some encoders omit the AMF0 object end marker on the last object.
//!
//! The detected encoder is only logged and shown in the live-status API.

use serde::Serialize;

/// Encoder family, detected from `flashVer` in `connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderType {
    #[default]
    Unknown,
    Obs,
    Ffmpeg,
    Wirecast,
    Fmle,
    Xsplit,
    Larix,
    Other,
}

impl EncoderType {
    pub fn from_flash_ver(flash_ver: &str) -> Self {
        let lower = flash_ver.to_ascii_lowercase();

        if lower.is_empty() {
            EncoderType::Unknown
        } else if lower.contains("obs") {
            EncoderType::Obs
        } else if lower.contains("fmle") || lower.contains("flash media") {
            EncoderType::Fmle
        } else if lower.contains("wirecast") {
            EncoderType::Wirecast
        } else if lower.contains("xsplit") {
            EncoderType::Xsplit
        } else if lower.contains("larix") {
            EncoderType::Larix
        } else if lower.contains("lavf") || lower.contains("librtmp") {
            EncoderType::Ffmpeg
        } else {
            EncoderType::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderType::Unknown => "unknown",
            EncoderType::Obs => "obs",
            EncoderType::Ffmpeg => "ffmpeg",
            EncoderType::Wirecast => "wirecast",
            EncoderType::Fmle => "fmle",
            EncoderType::Xsplit => "xsplit",
            EncoderType::Larix => "larix",
            EncoderType::Other => "other",
        }
    }
}

impl std::fmt::Display for EncoderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
