//! Registry error types

use thiserror::Error;

/// Publisher could not be authenticated
///
/// Unknown stream, wrong key and store failures all look the same to the
/// caller so stream names cannot be enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication failed")]
pub struct AuthError;

/// Stream name already has an active publisher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stream {name:?} already has an active publisher")]
pub struct ConflictError {
    pub name: String,
}
