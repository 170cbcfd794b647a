//! Stream metadata store
//!
//! The registry only needs one query: find a stream's record by name. The
//! CRUD side of stream management lives elsewhere; [`MemoryStore`] is the
//! implementation the server ships with, seeded from configuration.

pub mod memory;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{generate_key, MemoryStore, KEY_LENGTH};

/// A configured stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub stream_name: String,
    /// Shared secret the publisher must present
    #[serde(skip_serializing)]
    pub key: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

impl StreamRecord {
    pub fn new(stream_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            key: key.into(),
            display_name: None,
            is_public: true,
        }
    }
}

/// Store failures
///
/// The registry reports every one of these to the publisher as an
/// authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
    #[error("stream {0:?} already exists")]
    AlreadyExists(String),
}

/// Lookup used by publisher authentication
pub trait MetadataStore: Send + Sync + 'static {
    fn find_stream_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<StreamRecord>, StoreError>> + Send;
}
