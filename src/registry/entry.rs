//! Active stream record

use std::net::SocketAddr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::media::codec::{merge_codec_params, CodecParams, StreamMetadata};
use crate::session::{Session, SessionId};
use crate::stats::{MediaKind, PublishStats};

/// One live publish
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStream {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Unlisted streams are still reachable by name
    pub is_public: bool,

    /// One entry per elementary stream, in the order first seen
    pub codecs: Vec<CodecParams>,

    pub created_at: DateTime<Utc>,

    /// Session that owns the name
    pub session_id: SessionId,

    #[serde(skip)]
    pub peer_addr: Option<SocketAddr>,

    /// From `onMetaData`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StreamMetadata>,

    pub stats: PublishStats,

    #[serde(skip)]
    started: Instant,
}

impl ActiveStream {
    pub(super) fn new(session: &Session, codecs: Vec<CodecParams>) -> Self {
        let mut merged = Vec::with_capacity(codecs.len());
        merge_codec_params(&mut merged, codecs);

        Self {
            name: session.stream_name().to_string(),
            display_name: session.display_name().map(str::to_string),
            is_public: session.is_public(),
            codecs: merged,
            created_at: Utc::now(),
            session_id: session.id(),
            peer_addr: session.peer_addr(),
            metadata: None,
            stats: PublishStats::new(),
            started: Instant::now(),
        }
    }

    pub fn is_owned_by(&self, session: &Session) -> bool {
        self.session_id == session.id()
    }

    pub(super) fn update_codecs(&mut self, codecs: Vec<CodecParams>) {
        merge_codec_params(&mut self.codecs, codecs);
    }

    pub(super) fn record(&mut self, kind: MediaKind, bytes: usize, timestamp: u32) {
        self.stats.record(kind, bytes, timestamp);
    }

    /// Seconds since the stream went live
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Average publish bitrate (bits/sec)
    pub fn bitrate(&self) -> u64 {
        self.stats.bitrate(self.started.elapsed())
    }
}
