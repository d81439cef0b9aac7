//! Integration tests for the in-memory storage runtime.
//!
//! These tests exercise the application layer end-to-end: parsing text into
//! trees, registering them, mutating through the runtime, snapshots and
//! concurrent access from several threads.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use configx_core::{ConfigTree, MergePolicy, TreeError, Value};
use configx_storage::{RuntimeError, SnapshotHandle, SnapshotStore, StorageRuntime};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parsed(name: &str, text: &str) -> ConfigTree {
    ConfigTree::parse(name, text).expect("fixture text must parse")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_parse_register_and_query() {
    // Arrange
    let runtime = StorageRuntime::in_memory();
    let tree = parsed("app", "[server]\nport = 8080\nhost = \"localhost\"\n");

    // Act
    let handle = runtime.register("app", tree).unwrap();

    // Assert
    let tree = handle.read().unwrap();
    assert_eq!(tree.get_value("server.port").unwrap(), &Value::Int(8080));
    assert_eq!(tree.get_value("server.host").unwrap(), &Value::from("localhost"));
    assert_eq!(tree.leaf_count(), 2);
}

#[test]
fn test_layered_merge_of_parsed_layer() {
    // Arrange
    let runtime = StorageRuntime::in_memory();
    runtime
        .register("defaults", parsed("defaults", "[db]\npool = 4\ntimeout = 30\n"))
        .unwrap();
    let site = parsed("site", "[db]\npool = 16\n");

    // Act
    let revision = runtime
        .merge_into("defaults", &site, MergePolicy::Overwrite)
        .unwrap();

    // Assert
    assert_eq!(revision, 1);
    assert_eq!(runtime.names(), ["defaults"]);
    let handle = runtime.get_tree("defaults").unwrap();
    let tree = handle.read().unwrap();
    assert_eq!(tree.get_value("db.pool").unwrap(), &Value::Int(16));
    assert_eq!(tree.get_value("db.timeout").unwrap(), &Value::Int(30));
}

#[test]
fn test_layered_merge_across_registered_trees() {
    let runtime = StorageRuntime::in_memory();
    runtime.register("defaults", parsed("defaults", "a = 1\nb = 2\n")).unwrap();
    runtime.register("site", parsed("site", "b = 20\n")).unwrap();

    runtime
        .merge_from("defaults", "site", MergePolicy::Overwrite)
        .unwrap();

    let handle = runtime.get_tree("defaults").unwrap();
    let tree = handle.read().unwrap();
    assert_eq!(tree.get_value("a").unwrap(), &Value::Int(1));
    assert_eq!(tree.get_value("b").unwrap(), &Value::Int(20));
    assert!(runtime.contains("site"));
}

#[test]
fn test_prefer_existing_merge_keeps_target_values() {
    let runtime = StorageRuntime::in_memory();
    runtime.register("t", parsed("t", "a = 1\n")).unwrap();

    runtime
        .merge_into("t", &parsed("s", "a = 2\nb = 3\n"), MergePolicy::PreferExisting)
        .unwrap();

    let handle = runtime.get_tree("t").unwrap();
    let tree = handle.read().unwrap();
    assert_eq!(tree.get_value("a").unwrap(), &Value::Int(1));
    assert_eq!(tree.get_value("b").unwrap(), &Value::Int(3));
}

#[test]
fn test_failed_apply_changes_nothing() {
    let runtime = StorageRuntime::in_memory();
    runtime.register("app", parsed("app", "server = 1\n")).unwrap();

    let err = runtime.apply("app", "server.port", 80).unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::Tree {
            source: TreeError::PathConflict { .. },
            ..
        }
    ));
    let handle = runtime.get_tree("app").unwrap();
    let tree = handle.read().unwrap();
    assert_eq!(tree.revision(), 0);
    assert_eq!(tree.get_value("server").unwrap(), &Value::Int(1));
}

#[test]
fn test_snapshot_versions_increase_per_tree() {
    let runtime = StorageRuntime::in_memory();
    runtime.register("a", ConfigTree::new("a")).unwrap();
    runtime.register("b", ConfigTree::new("b")).unwrap();

    let a1 = runtime.snapshot("a").unwrap();
    let a2 = runtime.snapshot("a").unwrap();
    let b1 = runtime.snapshot("b").unwrap();

    assert_eq!(a1, SnapshotHandle::new("a", 1));
    assert_eq!(a2, SnapshotHandle::new("a", 2));
    assert_eq!(b1, SnapshotHandle::new("b", 1));
    assert_eq!(runtime.store().latest("a").unwrap(), Some(a2));
}

#[test]
fn test_restore_to_earlier_revision() {
    // Arrange
    let runtime = StorageRuntime::in_memory();
    runtime.register("app", ConfigTree::new("app")).unwrap();
    runtime.apply("app", "a", 1).unwrap();
    runtime.apply("app", "b", 2).unwrap();
    runtime.apply("app", "c", 3).unwrap();
    let at_three = runtime.snapshot("app").unwrap();
    runtime.apply("app", "c", 30).unwrap();
    runtime.delete("app", "a").unwrap();

    // Act
    let revision = runtime.restore("app", &at_three).unwrap();

    // Assert
    assert_eq!(revision, 3);
    let handle = runtime.get_tree("app").unwrap();
    let tree = handle.read().unwrap();
    assert_eq!(tree.get_value("a").unwrap(), &Value::Int(1));
    assert_eq!(tree.get_value("c").unwrap(), &Value::Int(3));
}

#[test]
fn test_restore_unknown_snapshot_is_not_found() {
    let runtime = StorageRuntime::in_memory();
    runtime.register("app", ConfigTree::new("app")).unwrap();

    let err = runtime
        .restore("app", &SnapshotHandle::new("app", 99))
        .unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::Snapshot(configx_storage::SnapshotError::NotFound(_))
    ));
}

#[test]
fn test_handle_after_remove_reports_not_found() {
    let runtime = StorageRuntime::in_memory();
    let handle = runtime.register("app", ConfigTree::new("app")).unwrap();

    runtime.remove("app").unwrap();

    assert!(matches!(handle.read(), Err(RuntimeError::NotFound(ref n)) if n == "app"));
    assert!(matches!(runtime.snapshot("app"), Err(RuntimeError::NotFound(_))));
}

#[test]
fn test_concurrent_writers_on_different_trees() {
    // Arrange
    let runtime = Arc::new(StorageRuntime::in_memory());
    for name in ["t0", "t1", "t2", "t3"] {
        runtime.register(name, ConfigTree::new(name)).unwrap();
    }

    // Act
    let workers: Vec<_> = (0..4)
        .map(|i| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                let name = format!("t{i}");
                for n in 0..100_i64 {
                    runtime.apply(&name, format!("k{n}").as_str(), n).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // Assert
    for name in runtime.names() {
        let handle = runtime.get_tree(&name).unwrap();
        let tree = handle.read().unwrap();
        assert_eq!(tree.revision(), 100, "tree {name}");
        assert_eq!(tree.leaf_count(), 100);
    }
}

#[test]
fn test_concurrent_readers_see_whole_revisions() {
    // Arrange
    let runtime = Arc::new(StorageRuntime::in_memory());
    runtime.register("app", ConfigTree::new("app")).unwrap();

    // Act: the writer always sets both keys to the same value
    let writer = {
        let runtime = Arc::clone(&runtime);
        thread::spawn(move || {
            for n in 0..200_i64 {
                let layer = parsed("layer", &format!("left = {n}\nright = {n}\n"));
                runtime
                    .merge_into("app", &layer, MergePolicy::Overwrite)
                    .unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                let handle = runtime.get_tree("app").unwrap();
                for _ in 0..200 {
                    let tree = handle.read().unwrap();
                    let left = tree.get_value("left").ok().cloned();
                    let right = tree.get_value("right").ok().cloned();
                    assert_eq!(left, right, "a merge must never be half visible");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    // Assert
    let handle = runtime.get_tree("app").unwrap();
    assert_eq!(handle.read().unwrap().revision(), 200);
}

#[test]
fn test_remove_waiting_on_reader_does_not_block_other_trees() {
    // Arrange: a reader holds tree "a" while another thread removes it
    let runtime = Arc::new(StorageRuntime::in_memory());
    let a = runtime.register("a", ConfigTree::new("a")).unwrap();
    runtime.register("b", ConfigTree::new("b")).unwrap();
    let reading = a.read().unwrap();
    let remover = {
        let runtime = Arc::clone(&runtime);
        thread::spawn(move || runtime.remove("a").map(|tree| tree.name().to_string()))
    };
    thread::sleep(Duration::from_millis(50));

    // Act
    let (done_tx, done_rx) = mpsc::channel();
    let writer = {
        let runtime = Arc::clone(&runtime);
        thread::spawn(move || {
            let revision = runtime.apply("b", "k", 1);
            let names = runtime.names();
            done_tx.send((revision.ok(), names)).unwrap();
        })
    };
    let outcome = done_rx.recv_timeout(Duration::from_secs(5));
    drop(reading);
    writer.join().unwrap();
    let removed = remover.join().unwrap();

    // Assert
    let (revision, names) = outcome.expect("apply on another tree must not wait for the reader");
    assert_eq!(revision, Some(1));
    assert!(names.contains(&"b".to_string()));
    assert_eq!(removed.unwrap(), "a");
    assert!(!a.is_live());
    assert_eq!(runtime.names(), ["b"]);
}

#[test]
fn test_strict_tree_only_accepts_updates() {
    let runtime = StorageRuntime::in_memory();
    let mut tree = parsed("app", "[server]\nport = 80\n");
    tree.set_strict(true);
    runtime.register("app", tree).unwrap();

    assert_eq!(runtime.apply("app", "server.port", 8080).unwrap(), 1);
    let err = runtime.apply("app", "server.host", "x").unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::Tree {
            source: TreeError::StrictMode(_),
            ..
        }
    ));
}
