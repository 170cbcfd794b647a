//! Counters for an active publish

use std::time::Duration;

use serde::Serialize;

/// What kind of media message was received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video { keyframe: bool },
    Audio,
}

/// Per-stream publish counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishStats {
    /// Media payload bytes
    pub bytes_received: u64,
    pub video_frames: u64,
    pub audio_frames: u64,
    pub keyframes: u64,
    /// Timestamp of the most recent media message (ms)
    pub last_timestamp: u32,
}

impl PublishStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: MediaKind, bytes: usize, timestamp: u32) {
        self.bytes_received += bytes as u64;
        self.last_timestamp = timestamp;
        match kind {
            MediaKind::Video { keyframe } => {
                self.video_frames += 1;
                if keyframe {
                    self.keyframes += 1;
                }
            }
            MediaKind::Audio => self.audio_frames += 1,
        }
    }

    /// Average bitrate (bits/sec) over `elapsed`
    pub fn bitrate(&self, elapsed: Duration) -> u64 {
        let secs = elapsed.as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }

    /// Average video frame rate over `elapsed`
    pub fn frame_rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.video_frames as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let mut stats = PublishStats::new();
        stats.record(MediaKind::Video { keyframe: true }, 1000, 0);
        stats.record(MediaKind::Video { keyframe: false }, 200, 33);
        stats.record(MediaKind::Audio, 50, 40);

        assert_eq!(stats.bytes_received, 1250);
        assert_eq!(stats.video_frames, 2);
        assert_eq!(stats.keyframes, 1);
        assert_eq!(stats.audio_frames, 1);
        assert_eq!(stats.last_timestamp, 40);
    }

    #[test]
    fn test_bitrate() {
        let stats = PublishStats {
            bytes_received: 1_000_000,
            ..Default::default()
        };

        // 1,000,000 bytes * 8 bits / 10 seconds
        assert_eq!(stats.bitrate(Duration::from_secs(10)), 800_000);
        assert_eq!(stats.bitrate(Duration::ZERO), 0);
    }

    #[test]
    fn test_frame_rate() {
        let stats = PublishStats {
            video_frames: 300,
            ..Default::default()
        };

        assert_eq!(stats.frame_rate(Duration::from_secs(10)), 30.0);
        assert_eq!(stats.frame_rate(Duration::ZERO), 0.0);
    }
}
