//! Viewer-facing transports

pub mod ws;

pub use ws::{serve_client, serve_split, HubConfig};
