//! Live group instances.
//!
//! One [`GroupRuntime`] per compiled schema. Backing-channel callbacks
//! arrive on each record's own processing context; they only record the
//! new reading and enqueue a dispatch event. Snapshot assembly and
//! subscriber notification happen on one dedicated task per group, the
//! single-writer discipline that gives subscribers FIFO snapshots and
//! keeps expensive assembly off every record's scan cycle. No locks are
//! shared across unrelated groups.

use crate::schema::GroupSchema;
use crate::snapshot::GroupSnapshot;
use crate::GroupError;
use crate::config::MappingKind;
use pvbridge_db::{BackingDatabase, BackingField, SubscriptionId};
use pvbridge_value::{Alarm, FieldReading, TimeTagMode, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Callback receiving each posted composite snapshot.
pub type SnapshotCallback = Arc<dyn Fn(&GroupSnapshot) + Send + Sync>;

/// Construction-time options for a group runtime.
#[derive(Default)]
pub struct GroupRuntimeOptions {
    /// Per-channel timestamp tag transforms, keyed by channel name.
    /// Validated at load time by [`crate::parse_time_tags`].
    pub time_tags: HashMap<String, TimeTagMode>,
}

/// Outcome of one field within a group put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutStatus {
    /// The backing write (or process request) succeeded.
    Applied,
    /// The backing operation failed for this reason.
    Failed(String),
    /// Skipped because an earlier-ordered field failed.
    Skipped,
}

/// Per-field entry of a [`PutReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPutOutcome {
    /// Field name within the group.
    pub field: String,
    /// What happened to it.
    pub status: PutStatus,
}

/// Report of a group put. Put is not atomic across fields: entries
/// before a failure stay applied, later ones are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutReport {
    /// Outcomes in application order (rejected entries first).
    pub outcomes: Vec<FieldPutOutcome>,
}

impl PutReport {
    /// True when every requested field applied.
    #[must_use]
    pub fn all_applied(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == PutStatus::Applied)
    }

    /// Status of a field by name.
    #[must_use]
    pub fn status_of(&self, field: &str) -> Option<&PutStatus> {
        self.outcomes
            .iter()
            .find(|o| o.field == field)
            .map(|o| &o.status)
    }
}

enum DispatchEvent {
    Changed(usize),
    PassBoundary,
    Shutdown,
}

struct Binding {
    field: Arc<dyn BackingField>,
    sub: SubscriptionId,
}

/// A live composite PV.
pub struct GroupRuntime {
    schema: Arc<GroupSchema>,
    /// Latest reading per field, indexed like `schema.fields`.
    slots: Vec<Arc<Mutex<FieldReading>>>,
    bindings: Vec<Option<Binding>>,
    db: Arc<dyn BackingDatabase>,
    pass_sub: Option<SubscriptionId>,
    subscribers: Arc<Mutex<HashMap<Uuid, SnapshotCallback>>>,
    tx: mpsc::UnboundedSender<DispatchEvent>,
    closed: AtomicBool,
}

impl GroupRuntime {
    /// Binds the schema's backing channels and spawns the group's
    /// dispatch task. Must run inside a tokio runtime.
    ///
    /// A missing backing channel degrades that field to an invalid-alarm
    /// reading instead of failing the whole group.
    pub fn start(
        schema: Arc<GroupSchema>,
        db: Arc<dyn BackingDatabase>,
        options: GroupRuntimeOptions,
    ) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut slots = Vec::with_capacity(schema.fields.len());
        let mut bindings = Vec::with_capacity(schema.fields.len());
        let mut tags = Vec::with_capacity(schema.fields.len());

        for def in &schema.fields {
            let tag = options
                .time_tags
                .get(&def.channel)
                .copied()
                .unwrap_or_default();
            tags.push(tag);
            match db.field(&def.channel) {
                Some(field) => {
                    let mut initial = field.read();
                    initial.time = tag.apply(initial.time);
                    slots.push(Arc::new(Mutex::new(initial)));
                    bindings.push(Some(field));
                }
                None => {
                    warn!(group = %schema.name, channel = %def.channel, "backing channel unavailable");
                    slots.push(Arc::new(Mutex::new(FieldReading {
                        value: Value::empty(),
                        alarm: Alarm::invalid(format!("channel {} unavailable", def.channel)),
                        time: Default::default(),
                    })));
                    bindings.push(None);
                }
            }
        }

        // Subscribe each bound channel. The callback runs on the backing
        // record's own context: store the reading, enqueue, return.
        let bindings: Vec<Option<Binding>> = bindings
            .into_iter()
            .enumerate()
            .map(|(idx, field)| {
                field.map(|field| {
                    let slot = slots[idx].clone();
                    let tag = tags[idx];
                    let tx = tx.clone();
                    let sub = field.subscribe(Arc::new(move |mut reading| {
                        reading.time = tag.apply(reading.time);
                        *slot.lock().unwrap() = reading;
                        let _ = tx.send(DispatchEvent::Changed(idx));
                    }));
                    Binding { field, sub }
                })
            })
            .collect();

        let pass_sub = schema.atomic.then(|| {
            let tx = tx.clone();
            db.subscribe_pass_boundary(Arc::new(move || {
                let _ = tx.send(DispatchEvent::PassBoundary);
            }))
        });

        let subscribers: Arc<Mutex<HashMap<Uuid, SnapshotCallback>>> =
            Arc::new(Mutex::new(HashMap::new()));

        // Dispatch task: sole writer of snapshot posts for this group.
        {
            let schema = schema.clone();
            let slots = slots.clone();
            let subscribers = subscribers.clone();
            tokio::spawn(async move {
                let mut pending: BTreeSet<usize> = BTreeSet::new();
                while let Some(event) = rx.recv().await {
                    match event {
                        DispatchEvent::Changed(idx) => {
                            if !schema.change_triggers_post(idx) {
                                continue;
                            }
                            if schema.atomic {
                                pending.insert(idx);
                            } else {
                                Self::post(&schema, &slots, &subscribers);
                            }
                        }
                        DispatchEvent::PassBoundary => {
                            if !pending.is_empty() {
                                pending.clear();
                                Self::post(&schema, &slots, &subscribers);
                            }
                        }
                        DispatchEvent::Shutdown => break,
                    }
                }
                debug!(group = %schema.name, "dispatch task stopped");
            });
        }

        Arc::new(Self {
            schema,
            slots,
            bindings,
            db,
            pass_sub,
            subscribers,
            tx,
            closed: AtomicBool::new(false),
        })
    }

    fn post(
        schema: &GroupSchema,
        slots: &[Arc<Mutex<FieldReading>>],
        subscribers: &Mutex<HashMap<Uuid, SnapshotCallback>>,
    ) {
        let readings: Vec<FieldReading> =
            slots.iter().map(|s| s.lock().unwrap().clone()).collect();
        let snapshot = GroupSnapshot::assemble(schema, &readings);
        let subs: Vec<SnapshotCallback> =
            subscribers.lock().unwrap().values().cloned().collect();
        debug!(group = %schema.name, subscribers = subs.len(), "posting snapshot");
        for cb in subs {
            cb(&snapshot);
        }
    }

    /// The compiled schema this instance serves.
    #[must_use]
    pub fn schema(&self) -> &Arc<GroupSchema> {
        &self.schema
    }

    /// Assembles the current composite snapshot.
    #[must_use]
    pub fn get(&self) -> GroupSnapshot {
        let readings: Vec<FieldReading> = self
            .slots
            .iter()
            .map(|s| s.lock().unwrap().clone())
            .collect();
        GroupSnapshot::assemble(&self.schema, &readings)
    }

    /// Applies a partial field→value update in ascending put-order.
    ///
    /// Fields without a declared put-order are rejected per-field;
    /// unknown names likewise. The first backing failure stops the
    /// sequence and later requested fields report `Skipped`.
    pub fn put(&self, updates: Vec<(String, Value)>) -> PutReport {
        let mut report = PutReport::default();
        let mut requested: HashMap<usize, Value> = HashMap::new();

        for (name, value) in updates {
            match self.schema.field_index(&name) {
                None => report.outcomes.push(FieldPutOutcome {
                    field: name.clone(),
                    status: PutStatus::Failed(GroupError::UnknownField(name).to_string()),
                }),
                Some(idx) if self.schema.fields[idx].put_order.is_none() => {
                    report.outcomes.push(FieldPutOutcome {
                        field: name.clone(),
                        status: PutStatus::Failed(
                            GroupError::FieldNotWritable(name).to_string(),
                        ),
                    })
                }
                Some(idx) => {
                    requested.insert(idx, value);
                }
            }
        }

        let mut failed = false;
        for &idx in self.schema.put_sequence() {
            let Some(value) = requested.remove(&idx) else {
                continue;
            };
            let def = &self.schema.fields[idx];
            if failed {
                report.outcomes.push(FieldPutOutcome {
                    field: def.name.clone(),
                    status: PutStatus::Skipped,
                });
                continue;
            }
            let result = match &self.bindings[idx] {
                None => Err(format!("channel {} unavailable", def.channel)),
                Some(binding) => {
                    if def.mapping == MappingKind::Proc {
                        // A proc field's only effect is record reprocessing.
                        binding.field.request_process().map_err(|e| e.to_string())
                    } else {
                        binding.field.write(value).map_err(|e| e.to_string())
                    }
                }
            };
            match result {
                Ok(()) => report.outcomes.push(FieldPutOutcome {
                    field: def.name.clone(),
                    status: PutStatus::Applied,
                }),
                Err(reason) => {
                    warn!(group = %self.schema.name, field = %def.name, %reason, "group put failed");
                    failed = true;
                    report.outcomes.push(FieldPutOutcome {
                        field: def.name.clone(),
                        status: PutStatus::Failed(reason),
                    });
                }
            }
        }
        report
    }

    /// Subscribes to composite monitor posts.
    pub fn subscribe(&self, callback: SnapshotCallback) -> Uuid {
        let id = Uuid::new_v4();
        self.subscribers.lock().unwrap().insert(id, callback);
        id
    }

    /// Removes a snapshot subscription.
    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.lock().unwrap().remove(&id);
    }

    /// Tears the instance down: unsubscribes every binding and stops the
    /// dispatch task. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for binding in self.bindings.iter().flatten() {
            binding.field.unsubscribe(binding.sub);
        }
        if let Some(id) = self.pass_sub {
            self.db.unsubscribe_pass_boundary(id);
        }
        self.subscribers.lock().unwrap().clear();
        let _ = self.tx.send(DispatchEvent::Shutdown);
    }
}

impl Drop for GroupRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
