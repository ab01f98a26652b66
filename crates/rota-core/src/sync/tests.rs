use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::timeout;

use crate::config::{SyncConfig, WatchMode};
use crate::sync::{
    fingerprint, ChangeCheck, ChangeWatcher, SaveOutcome, SessionEvent, SyncCoordinator,
    SyncSession, WatcherOptions,
};

fn config(dir: &Path) -> SyncConfig {
    let mut config = SyncConfig::for_dir(dir);
    config.lock_wait_ms = 2_000;
    config.lock_stale_ms = 1_000;
    config.lock_poll_interval_ms = 10;
    config.retry_backoff_ms = 10;
    config
}

fn client(dir: &Path, name: &str) -> Arc<SyncCoordinator> {
    Arc::new(SyncCoordinator::new(config(dir), name.parse().unwrap()).unwrap())
}

fn shared_files(dir: &Path) -> Vec<String> {
    let mut names = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_initialize_creates_exactly_one_document() {
    let dir = tempfile::tempdir().unwrap();

    let mut handles = Vec::new();
    for index in 0..8 {
        let desk = client(dir.path(), &format!("desk-{index}"));
        handles.push(tokio::spawn(async move { desk.initialize().await.unwrap() }));
    }

    let mut created = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.version, 1);
        if outcome.created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(shared_files(dir.path()), vec!["rota-sync.json".to_string()]);
    let document = client(dir.path(), "observer").load_document().await.unwrap();
    assert_eq!(document.version, 1);
    assert_eq!(document.payload, json!([]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_saves_from_same_view_never_both_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let first = client(dir.path(), "desk-1");
    let second = client(dir.path(), "desk-2");
    first.initialize().await.unwrap();
    first.load().await.unwrap();
    second.load().await.unwrap();

    let (left, right) = tokio::join!(
        {
            let first = Arc::clone(&first);
            tokio::spawn(async move { first.save(json!(["from-1"])).await.unwrap() })
        },
        {
            let second = Arc::clone(&second);
            tokio::spawn(async move { second.save(json!(["from-2"])).await.unwrap() })
        }
    );
    let outcomes = [left.unwrap(), right.unwrap()];

    let saved = outcomes
        .iter()
        .filter(|outcome| outcome.is_saved())
        .collect::<Vec<_>>();
    assert_eq!(saved.len(), 1);
    let SaveOutcome::Saved { version, .. } = saved[0] else {
        unreachable!()
    };
    assert_eq!(*version, 2);

    let conflict = outcomes
        .iter()
        .find_map(|outcome| match outcome {
            SaveOutcome::Conflict(conflict) => Some(conflict),
            SaveOutcome::Saved { .. } => None,
        })
        .expect("the slower writer must see a conflict");
    let document = first.load_document().await.unwrap();
    assert_eq!(document.version, 2);
    assert_eq!(conflict.remote, document.payload);
    assert_ne!(conflict.local, document.payload);
}

#[tokio::test]
async fn stale_view_save_is_rejected_with_both_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let desk_a = client(dir.path(), "desk-a");
    let desk_b = client(dir.path(), "desk-b");

    let init = desk_a.initialize().await.unwrap();
    assert!(init.created);
    assert_eq!(init.version, 1);

    assert_eq!(desk_b.load().await.unwrap(), json!([]));
    let f0 = desk_b.status().await.last_known_fingerprint.unwrap();
    assert_eq!(f0, fingerprint(&json!([])));

    let x = json!([{"week": 1, "OR-1": ["anna", "ben"]}]);
    let saved = desk_a.save(x.clone()).await.unwrap();
    assert_eq!(
        saved,
        SaveOutcome::Saved {
            version: 2,
            fingerprint: fingerprint(&x),
        }
    );

    let y = json!([{"week": 1, "OR-1": ["carla"]}]);
    let conflict = match desk_b.save(y.clone()).await.unwrap() {
        SaveOutcome::Conflict(conflict) => conflict,
        SaveOutcome::Saved { .. } => panic!("stale save must not overwrite"),
    };
    assert_eq!(conflict.remote, x);
    assert_eq!(conflict.local, y);
    assert_eq!(conflict.modified_by, "desk-a");
    assert_eq!(conflict.remote_version, 2);

    let document = desk_a.load_document().await.unwrap();
    assert_eq!(document.version, 2);
    assert_eq!(document.payload, x);
}

#[tokio::test]
async fn own_write_is_not_reported_as_change() {
    let dir = tempfile::tempdir().unwrap();
    let desk = client(dir.path(), "desk-a");
    desk.initialize().await.unwrap();

    desk.save(json!(["x"])).await.unwrap();
    assert_eq!(
        desk.check_for_changes().await.unwrap(),
        ChangeCheck::Unchanged
    );
}

#[tokio::test]
async fn check_for_changes_is_idempotent_and_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let writer = client(dir.path(), "desk-a");
    let reader = client(dir.path(), "desk-b");
    writer.initialize().await.unwrap();
    reader.load().await.unwrap();
    writer.save(json!(["x"])).await.unwrap();

    let document_path = dir.path().join("rota-sync.json");
    let before = std::fs::read(&document_path).unwrap();

    match reader.check_for_changes().await.unwrap() {
        ChangeCheck::Changed {
            payload,
            version,
            modified_by,
            ..
        } => {
            assert_eq!(payload, json!(["x"]));
            assert_eq!(version, 2);
            assert_eq!(modified_by, "desk-a");
        }
        ChangeCheck::Unchanged => panic!("remote write must be reported"),
    }
    for _ in 0..3 {
        assert_eq!(
            reader.check_for_changes().await.unwrap(),
            ChangeCheck::Unchanged
        );
    }

    assert_eq!(std::fs::read(&document_path).unwrap(), before);
    assert_eq!(shared_files(dir.path()), vec!["rota-sync.json".to_string()]);
}

#[tokio::test]
async fn abandoned_stale_lock_does_not_block_save() {
    let dir = tempfile::tempdir().unwrap();
    let desk = client(dir.path(), "desk-a");
    desk.initialize().await.unwrap();

    let lock_path = dir.path().join("rota-sync.lock");
    std::fs::write(&lock_path, "crashed-desk").unwrap();
    std::fs::File::options()
        .write(true)
        .open(&lock_path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(3_600))
        .unwrap();

    let started = Instant::now();
    let outcome = desk.save(json!(["after crash"])).await.unwrap();

    assert!(outcome.is_saved());
    assert!(started.elapsed() < Duration::from_millis(1_500));
    assert!(!lock_path.exists());
}

#[tokio::test]
async fn fresh_lock_that_is_never_released_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.lock_wait_ms = 300;
    config.lock_stale_ms = 60_000;
    let desk = SyncCoordinator::new(config, "desk-a".parse().unwrap()).unwrap();
    desk.initialize().await.unwrap();

    std::fs::write(dir.path().join("rota-sync.lock"), "hung-desk").unwrap();

    let started = Instant::now();
    let outcome = desk.save(json!(["x"])).await.unwrap();

    assert!(outcome.is_saved());
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn watcher_push_reaches_session_before_poll() {
    let dir = tempfile::tempdir().unwrap();
    let mut slow_poll = config(dir.path());
    slow_poll.poll_interval_ms = 60_000;

    let writer = client(dir.path(), "desk-a");
    let reader = Arc::new(SyncSession::new(Arc::new(
        SyncCoordinator::new(slow_poll, "desk-b".parse().unwrap()).unwrap(),
    )));
    writer.initialize().await.unwrap();
    reader.start().await.unwrap();

    let watcher = ChangeWatcher::start(
        dir.path().join("rota-sync.json"),
        WatcherOptions {
            debounce: Duration::from_millis(20),
            poll_interval: Duration::from_millis(20),
            mode: WatchMode::Polling,
        },
    );
    let mut events = reader.events();
    let background = reader.spawn_background(Some(&watcher));
    tokio::time::sleep(Duration::from_millis(100)).await;

    writer.save(json!([{"week": 9}])).await.unwrap();

    let received = timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SessionEvent::RemoteChanged { payload, .. }) = events.recv().await {
                return payload;
            }
        }
    })
    .await
    .expect("watcher notification should trigger a check");
    assert_eq!(received, json!([{"week": 9}]));

    background.stop();
    assert_eq!(watcher.subscriber_count(), 0);
}
