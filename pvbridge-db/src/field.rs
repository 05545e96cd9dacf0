//! The consumed collaborator traits.
//!
//! Change callbacks are synchronous and arrive on whatever execution
//! context the backing record's own processing uses, one independent
//! context per record. Implementations must tolerate callbacks being
//! invoked concurrently for distinct fields.

use crate::DbResult;
use pvbridge_value::{FieldReading, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Handle identifying one subscription, for later removal.
pub type SubscriptionId = Uuid;

/// Callback delivered on every value/meta change of a field.
pub type FieldCallback = Arc<dyn Fn(FieldReading) + Send + Sync>;

/// Callback delivered once per completed scan pass.
pub type PassCallback = Arc<dyn Fn() + Send + Sync>;

/// One named attribute of a backing record.
pub trait BackingField: Send + Sync {
    /// The channel name this field is addressed by.
    fn name(&self) -> &str;

    /// Reads the current value plus alarm and time metadata.
    fn read(&self) -> FieldReading;

    /// Writes a new value into the field.
    fn write(&self, value: Value) -> DbResult<()>;

    /// Asks the owning record to run its processing side effects.
    fn request_process(&self) -> DbResult<()>;

    /// Subscribes to value/meta changes. The callback may fire from any
    /// context; it must not block.
    fn subscribe(&self, callback: FieldCallback) -> SubscriptionId;

    /// Removes a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Whether the owning record's scan mode is passive. Input links use
    /// this for their process-if-passive policy.
    fn scan_is_passive(&self) -> bool;
}

/// The backing database as a whole: field lookup plus the scan-pass
/// boundary capability.
pub trait BackingDatabase: Send + Sync {
    /// Looks up a field by channel name.
    fn field(&self, name: &str) -> Option<Arc<dyn BackingField>>;

    /// Subscribes to the pass-boundary signal. The callback fires once
    /// after each batch of field changes that landed within one scan
    /// pass; atomic group coalescing defers dispatch until it does.
    fn subscribe_pass_boundary(&self, callback: PassCallback) -> SubscriptionId;

    /// Removes a pass-boundary subscription.
    fn unsubscribe_pass_boundary(&self, id: SubscriptionId);
}
