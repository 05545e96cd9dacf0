//! Remote link engine.
//!
//! A link binds a local backing field to a remote composite PV: input
//! links source the field's value from subscription updates, output
//! links push local writes out, either immediately or accumulated into
//! one deferred batched put. Each configured link owns a channel state
//! machine (`Disconnected → Connecting → Connected{Idle,OpInFlight} →
//! Closed`) with at most one network operation in flight at a time.
//!
//! The network side is the [`RemoteProvider`] seam. Production wires a
//! real client; tests and isolated deployments use
//! [`IsolatedProvider`], which resolves targets against a local
//! in-memory database. Isolation is chosen where the engine is
//! constructed, not by a process-wide toggle.

mod channel;
mod config;
mod engine;
mod order;
mod provider;

pub use channel::{ChannelPhase, LinkChannel};
pub use config::{InputProcPolicy, LinkSpec, ProcessRequest, SevrMode};
pub use engine::LinkEngine;
pub use order::{ConsumerId, MonitorOrderQueue, OrderedAction};
pub use provider::{
    IsolatedProvider, MonitorCallback, MonitorEvent, RemoteChannel, RemoteProvider,
};

/// Result type alias using the crate's error type.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Errors from link configuration and channel operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The target PV could not be resolved or is disconnected.
    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// The channel has been closed by reconfiguration or shutdown.
    #[error("channel closed")]
    Closed,

    /// A put or get addressed a sub-field the target does not have.
    #[error("{pv}: unknown sub-field {field:?}")]
    UnknownSubField {
        /// Target PV name.
        pv: String,
        /// The sub-field that failed to resolve.
        field: String,
    },

    /// The remote side reported a failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// The link declaration failed to parse or validate.
    #[error("bad link configuration: {0}")]
    BadConfig(String),
}
