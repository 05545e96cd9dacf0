//! Backing-database collaborator interface for pvbridge.
//!
//! The group and link engines never talk to record storage directly; they
//! consume the narrow seam defined here: per-field
//! read/write/subscribe/request-process, plus the database-wide scan-pass
//! boundary signal that atomic group coalescing is built on.
//!
//! [`mem`] provides the in-memory implementation used by every engine
//! test and by the link engine's isolated provider.

mod field;
pub mod mem;

pub use field::{
    BackingDatabase, BackingField, FieldCallback, PassCallback, SubscriptionId,
};
pub use mem::{MemDatabase, MemField};

/// Result type alias using the crate's error type.
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Errors surfaced by the backing database.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    /// No field with the given channel name exists.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// The field refused the written value.
    #[error("write rejected by {field}: {reason}")]
    WriteRejected {
        /// Channel name of the refusing field.
        field: String,
        /// Why the write was refused.
        reason: String,
    },
}
