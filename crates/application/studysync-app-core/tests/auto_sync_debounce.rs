use std::sync::{Arc, Mutex};
use std::time::Duration;

use studysync_app_core::{
    AutoSync, AutoSyncConfig, AutoSyncEvent, FileLocalStore, LocalDataSource, NotificationId,
    NotifyLevel, Notifier, SyncEvents,
};
use studysync_core::{DataSnapshot, ExerciseRecord};
use studysync_pipeline::remote::memory::CallCounts;
use studysync_pipeline::{InMemoryRemote, SyncEngine};

// --- Helpers ---

const USER: &str = "user-1";

struct StaticSource(DataSnapshot);

#[async_trait::async_trait]
impl LocalDataSource for StaticSource {
    async fn load(&self) -> anyhow::Result<DataSnapshot> {
        Ok(self.0.clone())
    }
}

struct BrokenSource;

#[async_trait::async_trait]
impl LocalDataSource for BrokenSource {
    async fn load(&self) -> anyhow::Result<DataSnapshot> {
        anyhow::bail!("disk unplugged")
    }
}

#[derive(Default)]
struct RecordingNotifier {
    log: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        self.log.lock().unwrap().push(format!("{level:?}: {message}"));
    }

    fn notify_loading(&self, message: &str) -> Option<NotificationId> {
        self.log.lock().unwrap().push(format!("loading: {message}"));
        Some(7)
    }

    fn update_to_success(&self, id: NotificationId, _message: &str) {
        self.log.lock().unwrap().push(format!("success #{id}"));
    }

    fn update_to_error(&self, id: NotificationId, _message: &str) {
        self.log.lock().unwrap().push(format!("error #{id}"));
    }
}

fn local() -> DataSnapshot {
    DataSnapshot {
        records: vec![ExerciseRecord::new("2024-01-01", "math", 20, 15, "25:00")],
        ..Default::default()
    }
}

fn fast() -> AutoSyncConfig {
    AutoSyncConfig {
        enabled: true,
        debounce: Duration::from_millis(40),
    }
}

fn collect(events: &SyncEvents) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    events.subscribe(move |ev: &AutoSyncEvent| {
        let tag = match ev {
            AutoSyncEvent::Started => "started",
            AutoSyncEvent::Progress(_) => "progress",
            AutoSyncEvent::Finished(_) => "finished",
            AutoSyncEvent::Failed { .. } => "failed",
            AutoSyncEvent::Cancelled => "cancelled",
        };
        sink.lock().unwrap().push(tag.to_string());
    });
    seen
}

// --- Tests ---

#[tokio::test]
async fn burst_of_changes_produces_one_upload() {
    let remote = Arc::new(InMemoryRemote::new(USER));
    let auto = AutoSync::new(
        SyncEngine::new(remote.clone()),
        Arc::new(StaticSource(local())),
        fast(),
    );
    let seen = collect(auto.events());

    let mut handles = Vec::new();
    for _ in 0..5 {
        handles.extend(auto.mark_dirty());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(CallCounts::get(&remote.records.calls.batch_insert), 1);
    assert_eq!(remote.records.rows_for(USER).len(), 1);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.iter().filter(|t| *t == "started").count(), 1);
    assert_eq!(seen.last().map(String::as_str), Some("finished"));
}

#[tokio::test]
async fn disabled_config_ignores_changes() {
    let remote = Arc::new(InMemoryRemote::new(USER));
    let auto = AutoSync::new(
        SyncEngine::new(remote.clone()),
        Arc::new(StaticSource(local())),
        AutoSyncConfig {
            enabled: false,
            ..fast()
        },
    );

    assert!(auto.mark_dirty().is_none());
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(CallCounts::get(&remote.records.calls.list), 0);
}

#[tokio::test]
async fn cancel_drops_pending_run() {
    let remote = Arc::new(InMemoryRemote::new(USER));
    let auto = AutoSync::new(
        SyncEngine::new(remote.clone()),
        Arc::new(StaticSource(local())),
        fast(),
    );
    let seen = collect(auto.events());

    let handle = auto.mark_dirty().unwrap();
    auto.cancel();
    handle.await.unwrap();

    assert_eq!(CallCounts::get(&remote.records.calls.list), 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unsubscribed_listener_misses_later_runs() {
    let remote = Arc::new(InMemoryRemote::new(USER));
    let events = Arc::new(SyncEvents::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let auto = AutoSync::with_parts(
        SyncEngine::new(remote.clone()),
        Arc::new(StaticSource(local())),
        fast(),
        notifier.clone(),
        events.clone(),
    );

    let count = Arc::new(Mutex::new(0usize));
    let counter = count.clone();
    let id = events.subscribe(move |_| *counter.lock().unwrap() += 1);

    let first = auto.sync_now().await;
    assert!(first.success);
    let after_first = *count.lock().unwrap();
    assert!(after_first >= 2);

    assert!(events.unsubscribe(id));
    auto.sync_now().await;
    assert_eq!(*count.lock().unwrap(), after_first);

    let log = notifier.log.lock().unwrap();
    assert_eq!(log[0], "loading: Syncing study data");
    assert_eq!(log[1], "success #7");
}

#[tokio::test]
async fn unreadable_local_data_fails_the_run() {
    let remote = Arc::new(InMemoryRemote::new(USER));
    let notifier = Arc::new(RecordingNotifier::default());
    let events = Arc::new(SyncEvents::new());
    let auto = AutoSync::with_parts(
        SyncEngine::new(remote.clone()),
        Arc::new(BrokenSource),
        fast(),
        notifier.clone(),
        events,
    );
    let seen = collect(auto.events());

    let result = auto.sync_now().await;

    assert!(!result.success);
    assert!(result.message.contains("disk unplugged"));
    assert_eq!(*seen.lock().unwrap(), vec!["started", "failed"]);
    assert_eq!(notifier.log.lock().unwrap().last().unwrap(), "error #7");
}

#[tokio::test]
async fn file_store_feeds_auto_sync() {
    let dir = tempfile::tempdir().unwrap();
    let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("data.json")).unwrap();
    let store = FileLocalStore::new(path);
    assert!(store.read().unwrap().is_empty());
    store.write(&local()).unwrap();

    let remote = Arc::new(InMemoryRemote::new(USER));
    let auto = AutoSync::new(SyncEngine::new(remote.clone()), Arc::new(store), fast());
    let result = auto.sync_now().await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.details.records.uploaded, 1);
}
