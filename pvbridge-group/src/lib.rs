//! Group composition engine.
//!
//! A group is a composite PV assembled from fields drawn from many
//! independently-scanned backing records, addressed by a single name. The
//! engine has two halves:
//!
//! - **Compiler**: per-record declarations (scattered JSON snippets) are
//!   merged and validated into one immutable [`GroupSchema`] per group
//!   name. Compilation happens once at (re)load; a running group never
//!   observes its schema mutate.
//! - **Runtime**: one [`GroupRuntime`] per compiled schema binds every
//!   field's backing channel, assembles atomically-observable composite
//!   snapshots, coalesces field changes into monitor posts, and
//!   serializes puts in field-declared order.

mod config;
mod runtime;
mod schema;
mod snapshot;

pub use config::{parse_time_tags, FieldAttributes, GroupDeclarations, MappingKind};
pub use runtime::{GroupRuntime, GroupRuntimeOptions, SnapshotCallback};
pub use schema::{compile, CompileOutcome, FieldDef, GroupSchema, Trigger};
pub use snapshot::{FieldOutput, GroupSnapshot, MappedOutput};

pub use runtime::{FieldPutOutcome, PutReport, PutStatus};

/// Result type alias using the crate's error type.
pub type GroupResult<T> = std::result::Result<T, GroupError>;

/// Errors from group compilation and runtime operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    /// Contributing records disagree on a group-scope attribute.
    #[error("schema conflict in group {group}: {detail}")]
    SchemaConflict {
        /// The group being compiled.
        group: String,
        /// Which declarations conflict, naming both records.
        detail: String,
    },

    /// A trigger set references a sibling field that does not exist.
    #[error("group {group}, field {field}: trigger references unknown field {trigger}")]
    UnknownTriggerField {
        group: String,
        field: String,
        trigger: String,
    },

    /// Two declarations contribute the same field name to one group.
    #[error("group {group}: duplicate field {field}")]
    DuplicateField { group: String, field: String },

    /// A field mapping has no backing channel.
    #[error("group {group}, field {field}: no channel declared")]
    MissingChannel { group: String, field: String },

    /// A record's declaration snippet failed to parse.
    #[error("record {record}: bad group declaration: {detail}")]
    BadDeclaration { record: String, detail: String },

    /// A timestamp tag configuration failed validation.
    #[error(transparent)]
    InvalidTimeTag(#[from] pvbridge_value::Error),

    /// A put named a field the group does not have.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// A put named a field with no declared put-order.
    #[error("field not writable: {0}")]
    FieldNotWritable(String),
}
