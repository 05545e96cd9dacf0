//! The per-link channel state machine.
//!
//! Every channel owns one op worker; puts and gets funnel through it so
//! at most one network operation is in flight at a time, in submission
//! order. Deferred output links accumulate sub-field writes locally and
//! ship them as a single batched put on [`LinkChannel::flush`].

use crate::config::{InputProcPolicy, LinkSpec, ProcessRequest};
use crate::order::{ConsumerId, MonitorOrderQueue, OrderedAction};
use crate::provider::{MonitorCallback, MonitorEvent, RemoteChannel, RemoteProvider};
use crate::{LinkError, LinkResult};
use pvbridge_db::{BackingField, SubscriptionId};
use pvbridge_value::{FieldReading, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Where a channel is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    /// Not connected; the target is unresolved or went away.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Connected, no operation in flight.
    Idle,
    /// Connected, one operation in flight.
    OpInFlight,
    /// Closed by reconfiguration or shutdown. Terminal.
    Closed,
}

enum RemoteState {
    Pending,
    Ready(Arc<dyn RemoteChannel>),
    Unavailable,
}

enum Op {
    Put {
        fields: Vec<(String, Value)>,
    },
    Get {
        sub_field: String,
        reply: oneshot::Sender<LinkResult<FieldReading>>,
    },
    Close,
}

struct ChannelState {
    phase: Mutex<ChannelPhase>,
    closed: AtomicBool,
    last: Mutex<Option<FieldReading>>,
    monitor: Mutex<Option<(Arc<dyn RemoteChannel>, SubscriptionId)>>,
    unpaced_noted: AtomicBool,
}

impl ChannelState {
    fn set_phase(&self, phase: ChannelPhase) {
        let mut current = self.phase.lock().unwrap();
        if *current != ChannelPhase::Closed {
            *current = phase;
        }
    }
}

/// One configured link: a target, its options, and the live channel.
pub struct LinkChannel {
    spec: LinkSpec,
    state: Arc<ChannelState>,
    ops: mpsc::UnboundedSender<Op>,
    remote_tx: Arc<watch::Sender<RemoteState>>,
    pending: Mutex<BTreeMap<String, Value>>,
    order: Arc<MonitorOrderQueue>,
    consumer: Option<ConsumerId>,
}

impl LinkChannel {
    /// Opens a channel for the given link declaration. Connection is
    /// asynchronous; operations submitted before it completes wait for
    /// it. When `owner` is set, monitor updates drive its reprocessing
    /// per the link's proc policy, sequenced by `order`. Must be called
    /// from within a tokio runtime.
    pub fn new(
        spec: LinkSpec,
        provider: Arc<dyn RemoteProvider>,
        owner: Option<Arc<dyn BackingField>>,
        order: Arc<MonitorOrderQueue>,
    ) -> Arc<Self> {
        let state = Arc::new(ChannelState {
            phase: Mutex::new(ChannelPhase::Disconnected),
            closed: AtomicBool::new(false),
            last: Mutex::new(None),
            monitor: Mutex::new(None),
            unpaced_noted: AtomicBool::new(false),
        });
        let (remote_tx, remote_rx) = watch::channel(RemoteState::Pending);
        let remote_tx = Arc::new(remote_tx);
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();

        let consumer = owner.as_ref().and_then(|owner| {
            let policy = spec.proc.input_policy();
            if policy == InputProcPolicy::Never {
                return None;
            }
            let owner = owner.clone();
            let action: OrderedAction = Arc::new(move || {
                let reprocess = match policy {
                    InputProcPolicy::Never => false,
                    InputProcPolicy::Always => true,
                    InputProcPolicy::IfPassive => owner.scan_is_passive(),
                };
                if reprocess {
                    if let Err(err) = owner.request_process() {
                        warn!(field = owner.name(), %err, "link reprocess failed");
                    }
                }
            });
            Some(order.register(spec.monorder, action))
        });

        let channel = Arc::new(Self {
            spec,
            state: state.clone(),
            ops: ops_tx,
            remote_tx: remote_tx.clone(),
            pending: Mutex::new(BTreeMap::new()),
            order,
            consumer,
        });

        let callback = channel.monitor_callback();
        tokio::spawn(run_connect(
            channel.spec.pv.clone(),
            channel.spec.queue_depth,
            provider,
            state.clone(),
            remote_tx,
            callback,
        ));
        tokio::spawn(run_ops(
            channel.spec.pv.clone(),
            channel.spec.proc,
            state,
            remote_rx,
            ops_rx,
        ));
        channel
    }

    fn monitor_callback(&self) -> MonitorCallback {
        let state = self.state.clone();
        let order = self.order.clone();
        let consumer = self.consumer;
        let pv = self.spec.pv.clone();
        Arc::new(move |event| match event {
            MonitorEvent::Connected => state.set_phase(ChannelPhase::Idle),
            MonitorEvent::Update(reading) => {
                if state.closed.load(Ordering::SeqCst) {
                    return;
                }
                *state.last.lock().unwrap() = Some(reading);
                let paced = {
                    let monitor = state.monitor.lock().unwrap();
                    monitor.as_ref().map(|(r, s)| (r.clone(), *s))
                };
                if let Some((remote, sub)) = paced {
                    if remote.supports_flow_control() {
                        remote.ack(sub);
                    } else if !state.unpaced_noted.swap(true, Ordering::SeqCst) {
                        debug!(pv = %pv, "monitor is unpaced, updates are not acknowledged");
                    }
                }
                if let Some(id) = consumer {
                    order.mark(id);
                }
            }
            MonitorEvent::Disconnected => state.set_phase(ChannelPhase::Disconnected),
        })
    }

    /// The declaration this channel was built from.
    #[must_use]
    pub fn spec(&self) -> &LinkSpec {
        &self.spec
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> ChannelPhase {
        *self.state.phase.lock().unwrap()
    }

    /// The most recent monitor reading, if any has arrived.
    #[must_use]
    pub fn last_reading(&self) -> Option<FieldReading> {
        self.state.last.lock().unwrap().clone()
    }

    /// Writes to the link's declared sub-field. Immediate links submit
    /// a remote put right away; deferred links only cache the value
    /// until [`flush`](Self::flush).
    pub fn put(&self, value: Value) -> LinkResult<()> {
        let sub_field = self.spec.field.clone();
        self.put_field(sub_field, value)
    }

    /// Writes to an explicit sub-field of the target. On a deferred
    /// link a second write to the same sub-field before the flush
    /// replaces the first.
    pub fn put_field(&self, sub_field: impl Into<String>, value: Value) -> LinkResult<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        let sub_field = sub_field.into();
        if self.spec.defer {
            self.pending.lock().unwrap().insert(sub_field, value);
            return Ok(());
        }
        self.ops
            .send(Op::Put {
                fields: vec![(sub_field, value)],
            })
            .map_err(|_| LinkError::Closed)
    }

    /// Ships all accumulated deferred writes as one batched put. A
    /// no-op when nothing is pending.
    pub fn flush(&self) -> LinkResult<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        let fields: Vec<(String, Value)> = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *pending).into_iter().collect()
        };
        debug!(pv = %self.spec.pv, count = fields.len(), "flushing deferred writes");
        self.ops
            .send(Op::Put { fields })
            .map_err(|_| LinkError::Closed)
    }

    /// Reads the link's declared sub-field from the remote side.
    pub async fn get(&self) -> LinkResult<FieldReading> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        let (reply, rx) = oneshot::channel();
        self.ops
            .send(Op::Get {
                sub_field: self.spec.field.clone(),
                reply,
            })
            .map_err(|_| LinkError::Closed)?;
        rx.await.map_err(|_| LinkError::Closed)?
    }

    /// Closes the channel: discards pending deferred writes, drops the
    /// monitor, and stops the op worker. Idempotent.
    pub fn close(&self) {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.phase.lock().unwrap() = ChannelPhase::Closed;
        self.pending.lock().unwrap().clear();
        if let Some(id) = self.consumer {
            self.order.unregister(id);
        }
        let monitor = self.state.monitor.lock().unwrap().take();
        if let Some((remote, sub)) = monitor {
            remote.unsubscribe(sub);
        }
        let _ = self.ops.send(Op::Close);
        // Wakes an op worker still waiting on the connection.
        let _ = self.remote_tx.send(RemoteState::Unavailable);
        debug!(pv = %self.spec.pv, "link channel closed");
    }
}

impl Drop for LinkChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connect(
    pv: String,
    queue_depth: u32,
    provider: Arc<dyn RemoteProvider>,
    state: Arc<ChannelState>,
    remote_tx: Arc<watch::Sender<RemoteState>>,
    callback: MonitorCallback,
) {
    state.set_phase(ChannelPhase::Connecting);
    match provider.connect(&pv).await {
        Ok(remote) => {
            let sub = remote.subscribe(queue_depth, callback);
            *state.monitor.lock().unwrap() = Some((remote.clone(), sub));
            if state.closed.load(Ordering::SeqCst) {
                // Closed while connecting; undo the subscription.
                let monitor = state.monitor.lock().unwrap().take();
                if let Some((remote, sub)) = monitor {
                    remote.unsubscribe(sub);
                }
                return;
            }
            let _ = remote_tx.send(RemoteState::Ready(remote));
            state.set_phase(ChannelPhase::Idle);
            debug!(pv = %pv, "link channel connected");
        }
        Err(err) => {
            warn!(pv = %pv, %err, "link target unavailable");
            let _ = remote_tx.send(RemoteState::Unavailable);
            state.set_phase(ChannelPhase::Disconnected);
        }
    }
}

async fn run_ops(
    pv: String,
    proc: ProcessRequest,
    state: Arc<ChannelState>,
    mut remote_rx: watch::Receiver<RemoteState>,
    mut ops: mpsc::UnboundedReceiver<Op>,
) {
    while let Some(op) = ops.recv().await {
        if matches!(op, Op::Close) {
            break;
        }
        let remote = {
            let waited = remote_rx
                .wait_for(|r| !matches!(r, RemoteState::Pending))
                .await;
            match waited.as_deref() {
                Ok(RemoteState::Ready(remote)) => Some(remote.clone()),
                _ => None,
            }
        };
        if state.closed.load(Ordering::SeqCst) {
            if let Op::Get { reply, .. } = op {
                let _ = reply.send(Err(LinkError::Closed));
            }
            break;
        }
        let Some(remote) = remote else {
            match op {
                Op::Put { .. } => warn!(pv = %pv, "dropping put, channel unavailable"),
                Op::Get { reply, .. } => {
                    let _ = reply.send(Err(LinkError::ChannelUnavailable(pv.clone())));
                }
                Op::Close => break,
            }
            continue;
        };
        state.set_phase(ChannelPhase::OpInFlight);
        match op {
            Op::Put { fields } => {
                if let Err(err) = remote.put(fields, proc).await {
                    warn!(pv = %pv, %err, "remote put failed");
                }
            }
            Op::Get { sub_field, reply } => {
                let _ = reply.send(remote.get(&sub_field).await);
            }
            Op::Close => break,
        }
        state.set_phase(ChannelPhase::Idle);
    }
}
