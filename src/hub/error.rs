//! Hub error types

use thiserror::Error;

/// A client's outbound queue cannot take another message
///
/// Never surfaced past the hub: the client is unregistered instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("client outbound queue is full")]
    Full,
    #[error("client outbound queue is closed")]
    Closed,
}
