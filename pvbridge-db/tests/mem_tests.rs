use pvbridge_db::{BackingDatabase, BackingField, DbError, MemDatabase};
use pvbridge_value::{FieldReading, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Field lookup and read/write ──────────────────────────────────

#[test]
fn field_lookup() {
    let db = MemDatabase::new();
    db.add_field("rec:X.VAL", FieldReading::of(1i32));

    assert!(db.field("rec:X.VAL").is_some());
    assert!(db.field("rec:missing").is_none());
}

#[test]
fn write_then_read() {
    let db = MemDatabase::new();
    let field = db.add_field("f", FieldReading::of(0i32));

    field.write(Value::from(14i32)).unwrap();
    assert_eq!(field.read().value, Value::from(14i32));
}

#[test]
fn rejected_write() {
    let db = MemDatabase::new();
    let field = db.add_field("f", FieldReading::of(0i32));
    field.set_reject_writes(true);

    let err = field.write(Value::from(1i32)).unwrap_err();
    assert!(matches!(err, DbError::WriteRejected { .. }));
    assert_eq!(field.read().value, Value::from(0i32));
}

// ── Subscriptions ────────────────────────────────────────────────

#[test]
fn subscription_delivers_changes() {
    let db = MemDatabase::new();
    let field = db.add_field("f", FieldReading::of(0i32));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    field.subscribe(Arc::new(move |r| seen2.lock().unwrap().push(r.value)));

    field.write(Value::from(1i32)).unwrap();
    field.write(Value::from(2i32)).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Value::from(1i32), Value::from(2i32)]
    );
}

#[test]
fn unsubscribe_stops_delivery() {
    let db = MemDatabase::new();
    let field = db.add_field("f", FieldReading::of(0i32));

    let count = Arc::new(AtomicUsize::new(0));
    let count2 = count.clone();
    let id = field.subscribe(Arc::new(move |_| {
        count2.fetch_add(1, Ordering::SeqCst);
    }));

    field.write(Value::from(1i32)).unwrap();
    field.unsubscribe(id);
    field.write(Value::from(2i32)).unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

// ── Pass boundary ────────────────────────────────────────────────

#[test]
fn single_write_is_its_own_pass() {
    let db = MemDatabase::new();
    let field = db.add_field("f", FieldReading::of(0i32));

    let passes = Arc::new(AtomicUsize::new(0));
    let passes2 = passes.clone();
    db.subscribe_pass_boundary(Arc::new(move || {
        passes2.fetch_add(1, Ordering::SeqCst);
    }));

    field.write(Value::from(1i32)).unwrap();
    assert_eq!(passes.load(Ordering::SeqCst), 1);
}

#[test]
fn staged_pass_emits_one_boundary() {
    let db = MemDatabase::new();
    let a = db.add_field("a", FieldReading::of(0i32));
    let b = db.add_field("b", FieldReading::of(0i32));

    let passes = Arc::new(AtomicUsize::new(0));
    let passes2 = passes.clone();
    db.subscribe_pass_boundary(Arc::new(move || {
        passes2.fetch_add(1, Ordering::SeqCst);
    }));

    db.begin_pass();
    a.write(Value::from(1i32)).unwrap();
    b.write(Value::from(2i32)).unwrap();
    assert_eq!(passes.load(Ordering::SeqCst), 0); // withheld
    db.end_pass();

    assert_eq!(passes.load(Ordering::SeqCst), 1);
}

#[test]
fn pass_boundary_unsubscribe() {
    let db = MemDatabase::new();
    let field = db.add_field("f", FieldReading::of(0i32));

    let passes = Arc::new(AtomicUsize::new(0));
    let passes2 = passes.clone();
    let id = db.subscribe_pass_boundary(Arc::new(move || {
        passes2.fetch_add(1, Ordering::SeqCst);
    }));
    db.unsubscribe_pass_boundary(id);

    field.write(Value::from(1i32)).unwrap();
    assert_eq!(passes.load(Ordering::SeqCst), 0);
}

// ── Process requests ─────────────────────────────────────────────

#[test]
fn process_counter_and_hook() {
    let db = MemDatabase::new();
    let field = db.add_field("f", FieldReading::of(0i32));

    let hooked = Arc::new(AtomicUsize::new(0));
    let hooked2 = hooked.clone();
    field.set_process_hook(move || {
        hooked2.fetch_add(1, Ordering::SeqCst);
    });

    field.request_process().unwrap();
    field.request_process().unwrap();

    assert_eq!(field.process_count(), 2);
    assert_eq!(hooked.load(Ordering::SeqCst), 2);
}

#[test]
fn scan_mode_defaults_passive() {
    let db = MemDatabase::new();
    let field = db.add_field("f", FieldReading::of(0i32));
    assert!(field.scan_is_passive());
    field.set_passive(false);
    assert!(!field.scan_is_passive());
}
