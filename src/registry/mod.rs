//! Stream registry
//!
//! Gates who may publish under which name and tracks what is live.
//!
//! ```text
//!  publish("alpha?key=..")
//!        │
//!        ▼
//!  authenticate ──► MetadataStore::find_stream_by_name   (no lock held)
//!        │
//!        ▼
//!  open_session ──► Mutex<HashMap<name, ActiveStream>> ──► "started" ──► status hub
//!        ⋮
//!  close_owned  ──► remove ──────────────────────────────► "stopped" ──► status hub
//! ```

pub mod entry;
pub mod error;
pub mod store;

pub use entry::ActiveStream;
pub use error::{AuthError, ConflictError};
pub use store::StreamRegistry;
