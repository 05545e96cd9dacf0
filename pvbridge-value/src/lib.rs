//! Scalar value handling for pvbridge.
//!
//! This crate defines the small, plugin-agnostic value vocabulary shared by
//! the group and link engines:
//! - A closed tagged scalar cell ([`Value`]) with exact and converting
//!   extraction
//! - Alarm severity/status metadata ([`Alarm`], [`AlarmSeverity`])
//! - Timestamps and the `nsec:lsb` tag-split transform ([`Timestamp`],
//!   [`TimeTagMode`])
//! - The reading triple delivered by every backing-field read or monitor
//!   ([`FieldReading`])
//!
//! Everything here is value-semantic. Cells are created on demand by call
//! sites and carry no identity of their own.

mod alarm;
mod reading;
mod scalar;
mod time;

pub use alarm::{Alarm, AlarmSeverity};
pub use reading::FieldReading;
pub use scalar::{Scalar, ScalarKind, Value};
pub use time::{split_nanos, TimeTagMode, Timestamp};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in value operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Exact extraction was asked for a kind the cell does not hold.
    #[error("type mismatch: cell holds {held:?}, requested {requested:?}")]
    TypeMismatch {
        /// Kind currently stored, `None` when the cell is empty.
        held: Option<ScalarKind>,
        /// Kind the caller asked for.
        requested: ScalarKind,
    },

    /// Converting extraction was asked of an empty cell.
    #[error("empty value")]
    EmptyValue,

    /// A stored string could not be converted to the requested kind.
    #[error("cannot convert {text:?} to {requested:?}")]
    Unparseable {
        /// The text that failed to parse.
        text: String,
        /// Kind the caller asked for.
        requested: ScalarKind,
    },

    /// A timestamp tag configuration named a split point outside [0,32].
    #[error("invalid timestamp split: {0}")]
    InvalidTimestampSplit(String),
}
