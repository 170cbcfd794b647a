//! Stream lifecycle events
//!
//! Serialized once by the registry and carried as opaque bytes from there
//! on:
//!
//! ```json
//! {"kind":"started","streamName":"alpha","timestamp":"2024-05-01T12:00:00Z"}
//! ```

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Started,
    Stopped,
}

/// A stream went live or went away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub stream_name: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn started(stream_name: impl Into<String>) -> Self {
        Self::now(StatusKind::Started, stream_name.into())
    }

    pub fn stopped(stream_name: impl Into<String>) -> Self {
        Self::now(StatusKind::Stopped, stream_name.into())
    }

    fn now(kind: StatusKind, stream_name: String) -> Self {
        Self {
            kind,
            stream_name,
            timestamp: Utc::now(),
        }
    }

    /// JSON encoding handed to the hub
    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn from_slice(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = StatusEvent::started("alpha");
        let json: serde_json::Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();

        assert_eq!(json["kind"], "started");
        assert_eq!(json["streamName"], "alpha");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_parse_back() {
        let event = StatusEvent::stopped("beta");
        let parsed = StatusEvent::from_slice(&event.to_bytes().unwrap()).unwrap();

        assert_eq!(parsed, event);
        assert_eq!(parsed.kind, StatusKind::Stopped);
    }

    #[test]
    fn test_encoding_is_single_line_json() {
        let bytes = StatusEvent::started("name with \"quotes\"").to_bytes().unwrap();
        assert!(!bytes.is_empty());
        assert!(!bytes.contains(&b'\n'));
        assert_eq!(StatusEvent::from_slice(&bytes).unwrap().stream_name, "name with \"quotes\"");
    }
}
