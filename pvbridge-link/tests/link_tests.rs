use async_trait::async_trait;
use pretty_assertions::assert_eq;
use pvbridge_db::{BackingField, MemDatabase, SubscriptionId};
use pvbridge_link::{
    ChannelPhase, IsolatedProvider, LinkChannel, LinkEngine, LinkError, LinkResult, LinkSpec,
    MonitorCallback, MonitorEvent, MonitorOrderQueue, ProcessRequest, RemoteChannel,
    RemoteProvider,
};
use pvbridge_value::{FieldReading, Value};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Lets the spawned connect/op/drain tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

// ── Recording mock remote ────────────────────────────────────────

#[derive(Default)]
struct RecordingRemote {
    puts: Mutex<Vec<(Vec<(String, Value)>, ProcessRequest)>>,
}

impl RecordingRemote {
    fn puts(&self) -> Vec<(Vec<(String, Value)>, ProcessRequest)> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteChannel for RecordingRemote {
    async fn get(&self, _sub_field: &str) -> LinkResult<FieldReading> {
        Ok(FieldReading::of(0i32))
    }

    async fn put(&self, fields: Vec<(String, Value)>, proc: ProcessRequest) -> LinkResult<()> {
        self.puts.lock().unwrap().push((fields, proc));
        Ok(())
    }

    fn subscribe(&self, _queue_depth: u32, callback: MonitorCallback) -> SubscriptionId {
        callback(MonitorEvent::Connected);
        Uuid::new_v4()
    }

    fn unsubscribe(&self, _id: SubscriptionId) {}
}

struct RecordingProvider {
    remote: Arc<RecordingRemote>,
}

#[async_trait]
impl RemoteProvider for RecordingProvider {
    async fn connect(&self, _pv: &str) -> LinkResult<Arc<dyn RemoteChannel>> {
        Ok(self.remote.clone())
    }
}

fn recording_channel(spec: LinkSpec) -> (Arc<LinkChannel>, Arc<RecordingRemote>) {
    let remote = Arc::new(RecordingRemote::default());
    let provider = Arc::new(RecordingProvider {
        remote: remote.clone(),
    });
    let order = Arc::new(MonitorOrderQueue::new());
    (LinkChannel::new(spec, provider, None, order), remote)
}

// ── Isolated output links ────────────────────────────────────────

#[tokio::test]
async fn put_reaches_isolated_target() {
    let db = Arc::new(MemDatabase::new());
    let target = db.add_field("target:ao", FieldReading::of(0i32));
    let owner = db.add_field("source:calc", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    let link = engine.configure(owner, &json!("target:ao")).unwrap();
    link.put(Value::Int32(14)).unwrap();
    settle().await;

    assert_eq!(target.read().value, Value::Int32(14));
    assert_eq!(link.phase(), ChannelPhase::Idle);
}

#[tokio::test]
async fn get_reads_isolated_target() {
    let db = Arc::new(MemDatabase::new());
    db.add_field("target:ai", FieldReading::of(7i32));
    let owner = db.add_field("source", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    let link = engine.configure(owner, &json!("target:ai")).unwrap();
    assert_eq!(link.get().await.unwrap().value, Value::Int32(7));
}

#[tokio::test]
async fn unknown_target_is_unavailable() {
    let db = Arc::new(MemDatabase::new());
    let owner = db.add_field("source", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    let link = engine.configure(owner, &json!("no:such:pv")).unwrap();
    settle().await;
    assert_eq!(link.phase(), ChannelPhase::Disconnected);
    assert_eq!(
        link.get().await,
        Err(LinkError::ChannelUnavailable("no:such:pv".to_string()))
    );
}

#[tokio::test]
async fn unknown_sub_field_is_rejected() {
    let db = Arc::new(MemDatabase::new());
    db.add_field("target", FieldReading::of(1i32));
    let owner = db.add_field("source", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    let link = engine
        .configure(owner, &json!({"pv": "target", "field": "display.limitLow"}))
        .unwrap();
    assert_eq!(
        link.get().await,
        Err(LinkError::UnknownSubField {
            pv: "target".to_string(),
            field: "display.limitLow".to_string(),
        })
    );
}

// ── Monitors ─────────────────────────────────────────────────────

#[tokio::test]
async fn monitor_updates_are_cached() {
    let db = Arc::new(MemDatabase::new());
    let target = db.add_field("target", FieldReading::of(3i32));
    let owner = db.add_field("source", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    let link = engine.configure(owner, &json!("target")).unwrap();
    settle().await;
    // The initial reading arrives with the subscription.
    assert_eq!(link.last_reading().map(|r| r.value), Some(Value::Int32(3)));

    target.post(FieldReading::of(5i32));
    settle().await;
    assert_eq!(link.last_reading().map(|r| r.value), Some(Value::Int32(5)));
}

// ── Deferred puts ────────────────────────────────────────────────

#[tokio::test]
async fn deferred_writes_batch_into_one_put() {
    let mut spec = LinkSpec::shorthand("tgt");
    spec.defer = true;
    let (channel, remote) = recording_channel(spec);

    channel.put_field("a", Value::Int32(1)).unwrap();
    channel.put_field("b", Value::Int32(2)).unwrap();
    settle().await;
    assert!(remote.puts().is_empty(), "nothing ships before the flush");

    channel.flush().unwrap();
    settle().await;
    let puts = remote.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(
        puts[0].0,
        vec![
            ("a".to_string(), Value::Int32(1)),
            ("b".to_string(), Value::Int32(2)),
        ]
    );
}

#[tokio::test]
async fn deferred_rewrite_keeps_last_value() {
    let mut spec = LinkSpec::shorthand("tgt");
    spec.defer = true;
    let (channel, remote) = recording_channel(spec);

    channel.put_field("a", Value::Int32(1)).unwrap();
    channel.put_field("a", Value::Int32(9)).unwrap();
    channel.flush().unwrap();
    // A flush with nothing pending ships nothing.
    channel.flush().unwrap();
    settle().await;

    let puts = remote.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].0, vec![("a".to_string(), Value::Int32(9))]);
}

#[tokio::test]
async fn immediate_link_ships_every_write() {
    let mut spec = LinkSpec::shorthand("tgt");
    spec.proc = ProcessRequest::Force;
    let (channel, remote) = recording_channel(spec);

    channel.put(Value::Int32(1)).unwrap();
    channel.put(Value::Int32(2)).unwrap();
    settle().await;

    let puts = remote.puts();
    assert_eq!(puts.len(), 2);
    assert_eq!(puts[0].0, vec![("".to_string(), Value::Int32(1))]);
    // The processing request rides along with each put.
    assert_eq!(puts[0].1, ProcessRequest::Force);
}

#[tokio::test]
async fn close_discards_pending_writes() {
    let mut spec = LinkSpec::shorthand("tgt");
    spec.defer = true;
    let (channel, remote) = recording_channel(spec);

    channel.put_field("a", Value::Int32(1)).unwrap();
    channel.close();
    assert_eq!(channel.phase(), ChannelPhase::Closed);
    assert_eq!(channel.flush(), Err(LinkError::Closed));
    assert_eq!(channel.put(Value::Int32(2)), Err(LinkError::Closed));
    settle().await;
    assert!(remote.puts().is_empty());
}

// ── Input-side reprocessing ──────────────────────────────────────

#[tokio::test]
async fn force_proc_reprocesses_on_every_update() {
    let db = Arc::new(MemDatabase::new());
    let target = db.add_field("target", FieldReading::of(0i32));
    let owner = db.add_field("owner", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    engine
        .configure(owner.clone(), &json!({"pv": "target", "proc": "force"}))
        .unwrap();
    settle().await;
    // The initial subscription update already reprocessed once.
    assert_eq!(owner.process_count(), 1);

    target.post(FieldReading::of(5i32));
    settle().await;
    assert_eq!(owner.process_count(), 2);
}

#[tokio::test]
async fn default_proc_never_reprocesses() {
    let db = Arc::new(MemDatabase::new());
    let target = db.add_field("target", FieldReading::of(0i32));
    let owner = db.add_field("owner", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    engine.configure(owner.clone(), &json!("target")).unwrap();
    settle().await;
    target.post(FieldReading::of(5i32));
    settle().await;
    assert_eq!(owner.process_count(), 0);
}

#[tokio::test]
async fn skip_proc_follows_scan_mode() {
    let db = Arc::new(MemDatabase::new());
    let target = db.add_field("target", FieldReading::of(0i32));
    let owner = db.add_field("owner", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    engine
        .configure(owner.clone(), &json!({"pv": "target", "proc": "skip"}))
        .unwrap();
    settle().await;
    assert_eq!(owner.process_count(), 1, "passive records reprocess");

    owner.set_passive(false);
    target.post(FieldReading::of(1i32));
    settle().await;
    assert_eq!(owner.process_count(), 1, "non-passive records do not");

    owner.set_passive(true);
    target.post(FieldReading::of(2i32));
    settle().await;
    assert_eq!(owner.process_count(), 2);
}

// ── Monitor ordering ─────────────────────────────────────────────

#[tokio::test]
async fn monorder_sequences_reprocessing() {
    let db = Arc::new(MemDatabase::new());
    let target = db.add_field("target", FieldReading::of(0i32));
    let owner_a = db.add_field("rec:a", FieldReading::of(0i32));
    let owner_b = db.add_field("rec:b", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    let log = Arc::new(Mutex::new(Vec::new()));
    let push = |tag: &'static str| {
        let log = log.clone();
        move || log.lock().unwrap().push(tag)
    };
    owner_a.set_process_hook(push("a"));
    owner_b.set_process_hook(push("b"));

    // Configured a-first, but b declares the lower order.
    engine
        .configure(
            owner_a.clone(),
            &json!({"pv": "target", "proc": "force", "monorder": 10}),
        )
        .unwrap();
    engine
        .configure(
            owner_b.clone(),
            &json!({"pv": "target", "proc": "force", "monorder": -1}),
        )
        .unwrap();
    settle().await;
    log.lock().unwrap().clear();

    target.post(FieldReading::of(1i32));
    settle().await;
    assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
}

#[tokio::test]
async fn equal_monorder_ties_break_by_configuration_order() {
    let db = Arc::new(MemDatabase::new());
    let target = db.add_field("target", FieldReading::of(0i32));
    let owner_a = db.add_field("rec:a", FieldReading::of(0i32));
    let owner_b = db.add_field("rec:b", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    let log = Arc::new(Mutex::new(Vec::new()));
    let push = |tag: &'static str| {
        let log = log.clone();
        move || log.lock().unwrap().push(tag)
    };
    owner_a.set_process_hook(push("a"));
    owner_b.set_process_hook(push("b"));

    engine
        .configure(owner_a.clone(), &json!({"pv": "target", "proc": "force"}))
        .unwrap();
    engine
        .configure(owner_b.clone(), &json!({"pv": "target", "proc": "force"}))
        .unwrap();
    settle().await;
    log.lock().unwrap().clear();

    target.post(FieldReading::of(1i32));
    settle().await;
    assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn reconfigure_closes_previous_channel() {
    let db = Arc::new(MemDatabase::new());
    db.add_field("t1", FieldReading::of(0i32));
    db.add_field("t2", FieldReading::of(0i32));
    let owner = db.add_field("owner", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    let first = engine.configure(owner.clone(), &json!("t1")).unwrap();
    let second = engine.configure(owner.clone(), &json!("t2")).unwrap();
    settle().await;

    assert_eq!(first.phase(), ChannelPhase::Closed);
    let current = engine.channel("owner").unwrap();
    assert!(Arc::ptr_eq(&current, &second));
    assert_eq!(current.spec().pv, "t2");
}

#[tokio::test]
async fn shutdown_closes_everything() {
    let db = Arc::new(MemDatabase::new());
    db.add_field("target", FieldReading::of(0i32));
    let owner = db.add_field("owner", FieldReading::of(0i32));
    let engine = LinkEngine::new(Arc::new(IsolatedProvider::new(db.clone())));

    let link = engine.configure(owner, &json!("target")).unwrap();
    settle().await;
    engine.shutdown();

    assert_eq!(link.phase(), ChannelPhase::Closed);
    assert_eq!(link.put(Value::Int32(1)), Err(LinkError::Closed));
    assert!(engine.channel("owner").is_none());
}
