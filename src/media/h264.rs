//! H.264 decoder configuration
//!
//! The AVC sequence header carries an AVCDecoderConfigurationRecord:
//!
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{Buf, Bytes};

use crate::error::MediaError;

/// AVC decoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, ...)
    pub profile: u8,
    pub compatibility: u8,
    /// AVC level times ten (31 = 3.1)
    pub level: u8,
    /// Size of the NALU length prefix in frames
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    pub fn parse(mut data: Bytes) -> Result<Self, MediaError> {
        if data.len() < 7 || data.get_u8() != 1 {
            return Err(MediaError::InvalidAvcPacket);
        }

        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = read_parameter_sets(&mut data, num_sps)?;

        if !data.has_remaining() {
            return Err(MediaError::InvalidAvcPacket);
        }
        let num_pps = data.get_u8() as usize;
        let pps = read_parameter_sets(&mut data, num_pps)?;

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
        })
    }

    pub fn profile_name(&self) -> &'static str {
        match self.profile {
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4",
            _ => "Unknown",
        }
    }

    /// Level as `major.minor`
    pub fn level_string(&self) -> String {
        format!("{}.{}", self.level / 10, self.level % 10)
    }
}

fn read_parameter_sets(data: &mut Bytes, count: usize) -> Result<Vec<Bytes>, MediaError> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if data.remaining() < 2 {
            return Err(MediaError::InvalidAvcPacket);
        }
        let len = data.get_u16() as usize;
        if data.remaining() < len {
            return Err(MediaError::InvalidAvcPacket);
        }
        sets.push(data.split_to(len));
    }
    Ok(sets)
}
