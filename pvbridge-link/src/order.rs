//! Monitor-order sequencing.
//!
//! When several links feed off the same remote source, their owning
//! records must reprocess in a declared order (`monorder`), not in
//! callback-arrival order. Consumers register an action once; monitor
//! callbacks only *mark* their consumer, and a single drain task runs
//! every marked action sorted by (order, registration sequence).

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

/// Handle identifying one registered consumer.
pub type ConsumerId = Uuid;

/// Action run when a marked consumer is drained. Must not block.
pub type OrderedAction = Arc<dyn Fn() + Send + Sync>;

struct Consumer {
    order: i32,
    seq: u64,
    action: OrderedAction,
}

#[derive(Default)]
struct Inner {
    consumers: Mutex<HashMap<ConsumerId, Consumer>>,
    // Sorted by (order, registration seq); the set also deduplicates
    // marks that land between drains.
    pending: Mutex<BTreeSet<(i32, u64, ConsumerId)>>,
    notify: Notify,
    next_seq: AtomicU64,
    closed: AtomicBool,
}

/// The shared sequencing queue. One per engine.
pub struct MonitorOrderQueue {
    inner: Arc<Inner>,
}

impl MonitorOrderQueue {
    /// Creates the queue and spawns its drain task. Must be called
    /// from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let inner = Arc::new(Inner::default());
        tokio::spawn(drain(inner.clone()));
        Self { inner }
    }

    /// Registers a consumer at the given order. Equal orders drain in
    /// registration order.
    pub fn register(&self, order: i32, action: OrderedAction) -> ConsumerId {
        let id = Uuid::new_v4();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        self.inner
            .consumers
            .lock()
            .unwrap()
            .insert(id, Consumer { order, seq, action });
        id
    }

    /// Removes a consumer; any outstanding mark for it is dropped.
    pub fn unregister(&self, id: ConsumerId) {
        let removed = self.inner.consumers.lock().unwrap().remove(&id);
        if let Some(consumer) = removed {
            self.inner
                .pending
                .lock()
                .unwrap()
                .remove(&(consumer.order, consumer.seq, id));
        }
    }

    /// Marks a consumer for the next drain. Repeated marks before the
    /// drain coalesce into one run.
    pub fn mark(&self, id: ConsumerId) {
        let key = {
            let consumers = self.inner.consumers.lock().unwrap();
            match consumers.get(&id) {
                Some(c) => (c.order, c.seq, id),
                None => return,
            }
        };
        self.inner.pending.lock().unwrap().insert(key);
        self.inner.notify.notify_one();
    }

    /// Stops the drain task. Marks after shutdown are ignored.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }
}

impl Default for MonitorOrderQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn drain(inner: Arc<Inner>) {
    loop {
        if inner.closed.load(Ordering::SeqCst) {
            debug!("monitor order queue stopped");
            return;
        }
        let batch = std::mem::take(&mut *inner.pending.lock().unwrap());
        if batch.is_empty() {
            inner.notify.notified().await;
            continue;
        }
        for (_, _, id) in batch {
            let action = inner
                .consumers
                .lock()
                .unwrap()
                .get(&id)
                .map(|c| c.action.clone());
            if let Some(action) = action {
                action();
            }
        }
    }
}
