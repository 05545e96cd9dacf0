//! The network seam.
//!
//! [`RemoteProvider`] and [`RemoteChannel`] abstract the client side of
//! the wire protocol. [`IsolatedProvider`] implements them against a
//! local in-memory database so a deployment (or a test) can resolve
//! link targets without any network at all; isolation is chosen by
//! constructing the engine with it, not by a global toggle.

use crate::config::ProcessRequest;
use crate::{LinkError, LinkResult};
use async_trait::async_trait;
use pvbridge_db::{BackingDatabase, BackingField, MemDatabase, SubscriptionId};
use pvbridge_value::{FieldReading, Value};
use std::sync::Arc;
use tracing::debug;

/// One event on a remote monitor.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The subscription is established; an [`Update`](Self::Update)
    /// with the current reading follows immediately.
    Connected,
    /// A new reading from the remote side.
    Update(FieldReading),
    /// The remote side went away; the subscription survives and
    /// resumes with `Connected` if it comes back.
    Disconnected,
}

/// Callback receiving monitor events. May fire from any context and
/// must not block.
pub type MonitorCallback = Arc<dyn Fn(MonitorEvent) + Send + Sync>;

/// A connected remote PV.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Reads one sub-field of the remote structure. The empty string
    /// selects the value at the top level.
    async fn get(&self, sub_field: &str) -> LinkResult<FieldReading>;

    /// Writes a batch of sub-fields in one operation, then applies the
    /// processing request.
    async fn put(&self, fields: Vec<(String, Value)>, proc: ProcessRequest) -> LinkResult<()>;

    /// Opens a monitor. `queue_depth` is advisory; the remote side may
    /// clamp or ignore it.
    fn subscribe(&self, queue_depth: u32, callback: MonitorCallback) -> SubscriptionId;

    /// Closes a monitor. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Whether the remote side paces monitor delivery on explicit
    /// acknowledgements.
    fn supports_flow_control(&self) -> bool {
        false
    }

    /// Acknowledges one consumed update on a paced monitor. No-op when
    /// pacing is unsupported.
    fn ack(&self, _id: SubscriptionId) {}
}

/// Resolves PV names to channels.
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    /// Connects to the named PV. Resolution failures surface as
    /// [`LinkError::ChannelUnavailable`].
    async fn connect(&self, pv: &str) -> LinkResult<Arc<dyn RemoteChannel>>;
}

// ── Isolated provider ────────────────────────────────────────────

/// A provider that resolves targets against a local [`MemDatabase`].
pub struct IsolatedProvider {
    db: Arc<MemDatabase>,
}

impl IsolatedProvider {
    /// Wraps the given database.
    #[must_use]
    pub fn new(db: Arc<MemDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RemoteProvider for IsolatedProvider {
    async fn connect(&self, pv: &str) -> LinkResult<Arc<dyn RemoteChannel>> {
        let field = self
            .db
            .field(pv)
            .ok_or_else(|| LinkError::ChannelUnavailable(pv.to_string()))?;
        debug!(pv, "isolated channel resolved");
        Ok(Arc::new(IsolatedChannel {
            pv: pv.to_string(),
            field,
        }))
    }
}

struct IsolatedChannel {
    pv: String,
    field: Arc<dyn BackingField>,
}

impl IsolatedChannel {
    /// Local fields expose only their value, addressed as the top
    /// level or as `value`.
    fn check_sub_field(&self, sub_field: &str) -> LinkResult<()> {
        if sub_field.is_empty() || sub_field == "value" {
            Ok(())
        } else {
            Err(LinkError::UnknownSubField {
                pv: self.pv.clone(),
                field: sub_field.to_string(),
            })
        }
    }
}

#[async_trait]
impl RemoteChannel for IsolatedChannel {
    async fn get(&self, sub_field: &str) -> LinkResult<FieldReading> {
        self.check_sub_field(sub_field)?;
        Ok(self.field.read())
    }

    async fn put(&self, fields: Vec<(String, Value)>, proc: ProcessRequest) -> LinkResult<()> {
        for (sub_field, value) in fields {
            self.check_sub_field(&sub_field)?;
            self.field
                .write(value)
                .map_err(|e| LinkError::Remote(e.to_string()))?;
        }
        if proc == ProcessRequest::Force {
            self.field
                .request_process()
                .map_err(|e| LinkError::Remote(e.to_string()))?;
        }
        Ok(())
    }

    fn subscribe(&self, queue_depth: u32, callback: MonitorCallback) -> SubscriptionId {
        debug!(pv = %self.pv, queue_depth, "isolated monitor opened");
        callback(MonitorEvent::Connected);
        callback(MonitorEvent::Update(self.field.read()));
        let forward = callback.clone();
        self.field
            .subscribe(Arc::new(move |reading| forward(MonitorEvent::Update(reading))))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.field.unsubscribe(id);
    }
}
