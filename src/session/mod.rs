//! Publisher session tracking

pub mod state;

pub use state::{Session, SessionId, SessionPhase, SessionState};
