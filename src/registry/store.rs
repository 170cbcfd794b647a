//! Stream registry implementation
//!
//! The registry is the only owner of the name to [`ActiveStream`] table.
//! The table sits behind one `parking_lot::Mutex` that is never held across
//! an await or any I/O; the metadata store is queried before the lock is
//! taken.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use parking_lot::Mutex;

use super::entry::ActiveStream;
use super::error::{AuthError, ConflictError};
use crate::event::StatusEvent;
use crate::hub::{HubHandle, Message};
use crate::media::codec::{CodecParams, StreamMetadata};
use crate::session::Session;
use crate::stats::MediaKind;
use crate::store::MetadataStore;

/// Authoritative table of publishing sessions
pub struct StreamRegistry<S> {
    store: S,
    streams: Mutex<HashMap<String, ActiveStream>>,
    /// Status hub; lifecycle events are submitted as inbound messages
    events: HubHandle,
}

impl<S: MetadataStore> StreamRegistry<S> {
    pub fn new(store: S, events: HubHandle) -> Self {
        Self {
            store,
            streams: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check a publisher's key against the metadata store
    pub async fn authenticate(&self, name: &str, key: &str) -> Result<Session, AuthError> {
        if name.is_empty() {
            return Err(AuthError);
        }

        let record = match self.store.find_stream_by_name(name).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(stream = %name, "Publish rejected: unknown stream");
                return Err(AuthError);
            }
            Err(e) => {
                tracing::warn!(stream = %name, error = %e, "Publish rejected: store lookup failed");
                return Err(AuthError);
            }
        };

        if !constant_time_eq(record.key.as_bytes(), key.as_bytes()) {
            tracing::warn!(stream = %name, "Publish rejected: invalid key");
            return Err(AuthError);
        }

        let session = Session::new(record.stream_name).with_listing(record.display_name, record.is_public);
        tracing::debug!(stream = %name, session_id = %session.id(), "Publisher authenticated");
        Ok(session)
    }

    /// Claim the session's stream name or update its codec parameters
    ///
    /// The first call creates the [`ActiveStream`] and emits "started".
    /// Later calls from the same session only merge `codecs`. A name held by
    /// another session is never taken over.
    pub fn open_session(
        &self,
        session: &Session,
        codecs: Vec<CodecParams>,
    ) -> Result<(), ConflictError> {
        let mut streams = self.streams.lock();

        match streams.entry(session.stream_name().to_string()) {
            Entry::Occupied(mut entry) => {
                let stream = entry.get_mut();
                if !stream.is_owned_by(session) {
                    tracing::warn!(
                        stream = %session.stream_name(),
                        session_id = %session.id(),
                        owner = %stream.session_id,
                        "Publish rejected: stream already live"
                    );
                    return Err(ConflictError {
                        name: session.stream_name().to_string(),
                    });
                }
                if !codecs.is_empty() {
                    stream.update_codecs(codecs);
                    tracing::debug!(
                        stream = %stream.name,
                        codecs = stream.codecs.len(),
                        "Codec parameters updated"
                    );
                }
            }
            Entry::Vacant(entry) => {
                let stream = entry.insert(ActiveStream::new(session, codecs));
                tracing::info!(
                    stream = %stream.name,
                    session_id = %stream.session_id,
                    peer = ?stream.peer_addr,
                    "Stream started"
                );
                // Queued under the lock so events for a name keep commit order
                self.emit(StatusEvent::started(&stream.name));
            }
        }

        Ok(())
    }

    /// Remove the stream if present; true when something was removed
    ///
    /// Emits "stopped" only for the call that removed it.
    pub fn close_session(&self, name: &str) -> bool {
        let mut streams = self.streams.lock();
        match streams.remove(name) {
            Some(stream) => {
                self.log_stopped(&stream);
                self.emit(StatusEvent::stopped(name));
                true
            }
            None => false,
        }
    }

    /// Remove the stream only if `session` still owns it
    pub fn close_owned(&self, session: &Session) -> bool {
        let mut streams = self.streams.lock();
        match streams.entry(session.stream_name().to_string()) {
            Entry::Occupied(entry) if entry.get().is_owned_by(session) => {
                let stream = entry.remove();
                self.log_stopped(&stream);
                self.emit(StatusEvent::stopped(&stream.name));
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ActiveStream> {
        self.streams.lock().get(name).cloned()
    }

    /// Snapshot of every live stream, oldest first
    pub fn active_streams(&self) -> Vec<ActiveStream> {
        let mut streams: Vec<_> = self.streams.lock().values().cloned().collect();
        streams.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        streams
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Attach encoder metadata; ignored unless `session` owns the stream
    pub fn update_metadata(&self, session: &Session, metadata: StreamMetadata) -> bool {
        let mut streams = self.streams.lock();
        match streams.get_mut(session.stream_name()) {
            Some(stream) if stream.is_owned_by(session) => {
                tracing::debug!(stream = %stream.name, ?metadata, "Stream metadata updated");
                stream.metadata = Some(metadata);
                true
            }
            _ => false,
        }
    }

    /// Count a media message against the session's stream
    pub fn record_media(&self, session: &Session, kind: MediaKind, bytes: usize, timestamp: u32) {
        let mut streams = self.streams.lock();
        if let Some(stream) = streams.get_mut(session.stream_name()) {
            if stream.is_owned_by(session) {
                stream.record(kind, bytes, timestamp);
            }
        }
    }

    fn emit(&self, event: StatusEvent) {
        match event.to_bytes() {
            Ok(data) => self.events.submit_inbound(Message::internal(data)),
            Err(e) => tracing::error!(
                stream = %event.stream_name,
                kind = ?event.kind,
                error = %e,
                "Failed to encode status event"
            ),
        }
    }

    fn log_stopped(&self, stream: &ActiveStream) {
        tracing::info!(
            stream = %stream.name,
            session_id = %stream.session_id,
            uptime_secs = stream.uptime_secs(),
            bytes = stream.stats.bytes_received,
            "Stream stopped"
        );
    }
}

/// Constant-time byte comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
