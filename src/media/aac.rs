//! AAC AudioSpecificConfig
//!
//! The AAC sequence header is a bit-packed AudioSpecificConfig:
//!
//! ```text
//! audioObjectType (5) | samplingFrequencyIndex (4) | [samplingFrequency (24)]
//! | channelConfiguration (4) | ...
//! ```

use bytes::Bytes;

use crate::error::MediaError;

const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub audio_object_type: u8,
    pub sampling_frequency: u32,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    pub fn parse(data: &Bytes) -> Result<Self, MediaError> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket);
        }

        let b0 = data[0];
        let b1 = data[1];
        let audio_object_type = b0 >> 3;
        let index = ((b0 & 0x07) << 1) | (b1 >> 7);

        let (sampling_frequency, channel_configuration) = if index == 0x0F {
            // Explicit 24-bit frequency, then the channel configuration
            if data.len() < 5 {
                return Err(MediaError::InvalidAacPacket);
            }
            let freq = ((data[1] as u32 & 0x7F) << 17)
                | ((data[2] as u32) << 9)
                | ((data[3] as u32) << 1)
                | (data[4] as u32 >> 7);
            (freq, (data[4] >> 3) & 0x0F)
        } else {
            let freq = *SAMPLING_FREQUENCIES
                .get(index as usize)
                .ok_or(MediaError::InvalidAacPacket)?;
            (freq, (b1 >> 3) & 0x0F)
        };

        Ok(Self {
            audio_object_type,
            sampling_frequency,
            channel_configuration,
        })
    }

    pub fn profile_name(&self) -> &'static str {
        match self.audio_object_type {
            1 => "Main",
            2 => "LC",
            3 => "SSR",
            4 => "LTP",
            5 => "HE-AAC",
            29 => "HE-AACv2",
            _ => "Unknown",
        }
    }

    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            7 => 8,
            c @ 1..=6 => c,
            _ => 0,
        }
    }
}
