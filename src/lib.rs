//! Nexus live server
//!
//! Publishers push RTMP to the ingest listener; each `publish` is checked
//! against the metadata store and recorded in the [`StreamRegistry`]. Stream
//! lifecycle events flow through two broadcast hubs to WebSocket viewers:
//!
//! ```text
//!  RTMP publisher ──► IngestServer ──► StreamRegistry ──► status Hub ──► Bridge ──► viewer Hub ──► viewers
//!                                            ▲               ▲
//!                                     MetadataStore   /v1/ws/streamstatus
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nexus_server::{Bridge, Hub, IngestServer, MemoryStore, ServerConfig, StreamRecord, StreamRegistry};
//!
//! #[tokio::main]
//! async fn main() -> nexus_server::Result<()> {
//!     let (viewer_hub, viewers) = Hub::new("updates");
//!     viewer_hub.spawn();
//!     let (status_hub, status) = Hub::with_handler("status", Bridge::new(viewers));
//!     status_hub.spawn();
//!
//!     let store = MemoryStore::with_records([StreamRecord::new("alpha", "secret1")])?;
//!     let registry = Arc::new(StreamRegistry::new(store, status));
//!
//!     IngestServer::new(ServerConfig::default(), registry).run().await
//! }
//! ```

pub mod amf;
pub mod api;
pub mod bridge;
pub mod config;
pub mod error;
pub mod event;
pub mod hub;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;
pub mod transport;

pub use bridge::Bridge;
pub use config::NexusConfig;
pub use error::{Error, Result};
pub use event::{StatusEvent, StatusKind};
pub use hub::{Client, Hub, HubHandle, Message};
pub use registry::{ActiveStream, StreamRegistry};
pub use server::{IngestServer, ServerConfig};
pub use session::{Session, SessionId, SessionPhase};
pub use store::{MemoryStore, MetadataStore, StreamRecord};
pub use transport::HubConfig;
