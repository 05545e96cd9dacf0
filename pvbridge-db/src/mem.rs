//! In-memory backing database.
//!
//! Behaves like the real collaborator from the engines' point of view:
//! per-field change callbacks, a pass-boundary signal, per-record scan
//! mode, and process requests. Tests stage multi-field atomic updates
//! with [`MemDatabase::begin_pass`] / [`MemDatabase::end_pass`]; writes
//! outside a staged pass count as their own single-change pass and emit
//! the boundary immediately.

use crate::field::{
    BackingDatabase, BackingField, FieldCallback, PassCallback, SubscriptionId,
};
use crate::{DbError, DbResult};
use pvbridge_value::{Alarm, FieldReading, Timestamp, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Shared state between the database and its fields.
#[derive(Default)]
struct Shared {
    pass_subs: Mutex<HashMap<SubscriptionId, PassCallback>>,
    in_pass: AtomicBool,
}

impl Shared {
    fn emit_pass_boundary(&self) {
        let subs: Vec<PassCallback> = self.pass_subs.lock().unwrap().values().cloned().collect();
        for cb in subs {
            cb();
        }
    }
}

/// One in-memory field.
pub struct MemField {
    name: String,
    shared: Arc<Shared>,
    reading: Mutex<FieldReading>,
    subs: Mutex<HashMap<SubscriptionId, FieldCallback>>,
    passive: AtomicBool,
    reject_writes: AtomicBool,
    process_count: AtomicU64,
    process_hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl MemField {
    fn new(name: impl Into<String>, initial: FieldReading, shared: Arc<Shared>) -> Self {
        Self {
            name: name.into(),
            shared,
            reading: Mutex::new(initial),
            subs: Mutex::new(HashMap::new()),
            passive: AtomicBool::new(true),
            reject_writes: AtomicBool::new(false),
            process_count: AtomicU64::new(0),
            process_hook: Mutex::new(None),
        }
    }

    /// Replaces the full reading (value, alarm, time) and notifies
    /// subscribers, as a record's own processing would.
    pub fn post(&self, reading: FieldReading) {
        *self.reading.lock().unwrap() = reading.clone();
        self.notify(reading);
        if !self.shared.in_pass.load(Ordering::SeqCst) {
            self.shared.emit_pass_boundary();
        }
    }

    /// Number of process requests received so far.
    pub fn process_count(&self) -> u64 {
        self.process_count.load(Ordering::SeqCst)
    }

    /// Sets the record's scan mode (passive by default).
    pub fn set_passive(&self, passive: bool) {
        self.passive.store(passive, Ordering::SeqCst);
    }

    /// Makes subsequent writes fail, for partial-failure tests.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Installs a hook invoked on every process request, after the
    /// counter increments. Link tests use this to model a record whose
    /// processing flushes a deferred link.
    pub fn set_process_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.process_hook.lock().unwrap() = Some(Box::new(hook));
    }

    fn notify(&self, reading: FieldReading) {
        let subs: Vec<FieldCallback> = self.subs.lock().unwrap().values().cloned().collect();
        for cb in subs {
            cb(reading.clone());
        }
    }
}

impl BackingField for MemField {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> FieldReading {
        self.reading.lock().unwrap().clone()
    }

    fn write(&self, value: Value) -> DbResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(DbError::WriteRejected {
                field: self.name.clone(),
                reason: "rejected by test configuration".to_string(),
            });
        }
        let reading = FieldReading::new(value, Alarm::none(), Timestamp::now());
        self.post(reading);
        Ok(())
    }

    fn request_process(&self) -> DbResult<()> {
        self.process_count.fetch_add(1, Ordering::SeqCst);
        debug!(field = %self.name, "process requested");
        if let Some(hook) = self.process_hook.lock().unwrap().as_ref() {
            hook();
        }
        Ok(())
    }

    fn subscribe(&self, callback: FieldCallback) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.subs.lock().unwrap().insert(id, callback);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subs.lock().unwrap().remove(&id);
    }

    fn scan_is_passive(&self) -> bool {
        self.passive.load(Ordering::SeqCst)
    }
}

/// In-memory backing database.
#[derive(Default)]
pub struct MemDatabase {
    shared: Arc<Shared>,
    fields: RwLock<HashMap<String, Arc<MemField>>>,
}

impl MemDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field with an initial reading, returning the concrete
    /// handle so tests can drive it.
    pub fn add_field(
        &self,
        name: impl Into<String>,
        initial: FieldReading,
    ) -> Arc<MemField> {
        let name = name.into();
        let field = Arc::new(MemField::new(name.clone(), initial, self.shared.clone()));
        self.fields.write().unwrap().insert(name, field.clone());
        field
    }

    /// Looks up the concrete field handle.
    pub fn mem_field(&self, name: &str) -> Option<Arc<MemField>> {
        self.fields.read().unwrap().get(name).cloned()
    }

    /// Begins a staged scan pass: writes notify field subscribers but
    /// the pass boundary is withheld until [`end_pass`](Self::end_pass).
    pub fn begin_pass(&self) {
        self.shared.in_pass.store(true, Ordering::SeqCst);
    }

    /// Ends the staged pass and emits the boundary signal once.
    pub fn end_pass(&self) {
        self.shared.in_pass.store(false, Ordering::SeqCst);
        self.shared.emit_pass_boundary();
    }
}

impl BackingDatabase for MemDatabase {
    fn field(&self, name: &str) -> Option<Arc<dyn BackingField>> {
        self.fields
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .map(|f| f as Arc<dyn BackingField>)
    }

    fn subscribe_pass_boundary(&self, callback: PassCallback) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.shared.pass_subs.lock().unwrap().insert(id, callback);
        id
    }

    fn unsubscribe_pass_boundary(&self, id: SubscriptionId) {
        self.shared.pass_subs.lock().unwrap().remove(&id);
    }
}
