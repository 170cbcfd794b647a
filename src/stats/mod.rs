//! Publish statistics

pub mod metrics;

pub use metrics::{MediaKind, PublishStats};
