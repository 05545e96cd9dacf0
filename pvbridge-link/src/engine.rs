//! Link lifecycle management.
//!
//! The engine owns the provider, the shared monitor-order queue, and
//! every configured channel, keyed by the owning local field's channel
//! name. Reconfiguring a field closes its old channel first, so stale
//! monitors never outlive the declaration that created them.

use crate::channel::LinkChannel;
use crate::config::LinkSpec;
use crate::order::MonitorOrderQueue;
use crate::provider::RemoteProvider;
use crate::LinkResult;
use pvbridge_db::BackingField;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Owns all remote links of one database.
pub struct LinkEngine {
    provider: Arc<dyn RemoteProvider>,
    order: Arc<MonitorOrderQueue>,
    channels: Mutex<HashMap<String, Arc<LinkChannel>>>,
}

impl LinkEngine {
    /// Creates an engine over the given provider. Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn new(provider: Arc<dyn RemoteProvider>) -> Self {
        Self {
            provider,
            order: Arc::new(MonitorOrderQueue::new()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Configures (or reconfigures) the link owned by `owner` from a
    /// JSON declaration: either a bare target string or a full option
    /// object.
    pub fn configure(
        &self,
        owner: Arc<dyn BackingField>,
        decl: &serde_json::Value,
    ) -> LinkResult<Arc<LinkChannel>> {
        let spec = LinkSpec::parse(decl)?;
        self.configure_spec(owner, spec)
    }

    /// Configures a link from an already-parsed declaration.
    pub fn configure_spec(
        &self,
        owner: Arc<dyn BackingField>,
        spec: LinkSpec,
    ) -> LinkResult<Arc<LinkChannel>> {
        let name = owner.name().to_string();
        info!(field = %name, pv = %spec.pv, "configuring link");
        let channel = LinkChannel::new(
            spec,
            self.provider.clone(),
            Some(owner),
            self.order.clone(),
        );
        let previous = self
            .channels
            .lock()
            .unwrap()
            .insert(name, channel.clone());
        if let Some(previous) = previous {
            previous.close();
        }
        Ok(channel)
    }

    /// The channel configured for the named local field, if any.
    #[must_use]
    pub fn channel(&self, field: &str) -> Option<Arc<LinkChannel>> {
        self.channels.lock().unwrap().get(field).cloned()
    }

    /// Removes the named field's link, closing its channel.
    pub fn remove(&self, field: &str) {
        if let Some(channel) = self.channels.lock().unwrap().remove(field) {
            channel.close();
        }
    }

    /// Closes every channel and stops the ordering queue. Idempotent.
    pub fn shutdown(&self) {
        let channels: Vec<Arc<LinkChannel>> =
            self.channels.lock().unwrap().drain().map(|(_, c)| c).collect();
        for channel in channels {
            channel.close();
        }
        self.order.shutdown();
    }
}

impl Drop for LinkEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
