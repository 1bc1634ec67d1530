// tests/canonical_tests.rs
// Canonical snapshots through the facade: archive-before-overwrite,
// versioning, replay from archive, aggregate context.

use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use fossil_core::{CanonicalCategory, FossilStore, ManualClock, StaticVcs, StoreConfig};

fn open_store(root: &Path) -> FossilStore {
    let clock = ManualClock::stepping(
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap(),
        Duration::milliseconds(250),
    );
    FossilStore::open(
        StoreConfig::at(root),
        Arc::new(StaticVcs::new("9f2c1e7", "feature/fossils")),
        Arc::new(clock),
    )
    .expect("open store")
}

fn live_bytes(store: &FossilStore, category: CanonicalCategory) -> Vec<u8> {
    fs::read(store.config().canonical_dir().join(category.file_name())).expect("read live")
}

#[test]
fn first_update_has_no_archive_second_has_one() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path());

    let w1 = store
        .update_category(CanonicalCategory::Performance, json!({"metrics": {"p50_ms": 12}}))
        .expect("first update");
    assert_eq!(w1.path, store.config().canonical_dir().join("performance.json"));
    assert!(w1.archived.is_none());
    assert!(store.list_archives(CanonicalCategory::Performance).expect("archives").is_empty());

    let w2 = store
        .update_category(CanonicalCategory::Performance, json!({"metrics": {"p50_ms": 9}}))
        .expect("second update");
    assert_eq!(w2.version, 2);
    assert_eq!(store.list_archives(CanonicalCategory::Performance).expect("archives").len(), 1);
}

#[test]
fn archive_holds_first_payload_and_replay_reproduces_it() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path());

    store
        .update_category(CanonicalCategory::Validation, json!({"status": "fail", "validation_steps": ["lint", "test"]}))
        .expect("first");
    let first = live_bytes(&store, CanonicalCategory::Validation);
    store
        .update_category(CanonicalCategory::Validation, json!({"status": "pass", "summary": "fixed"}))
        .expect("second");

    let live = store
        .get_category(CanonicalCategory::Validation)
        .expect("get")
        .expect("present");
    assert_eq!(live["status"], "pass");
    assert_eq!(live["metadata"]["version"], 2);

    let archives = store.list_archives(CanonicalCategory::Validation).expect("archives");
    assert_eq!(archives.len(), 1);
    assert_eq!(fs::read(&archives[0]).expect("read archive"), first);
    let archived: Value = serde_json::from_slice(&first).expect("archived json");
    assert_eq!(archived["status"], "fail");
    assert_eq!(archived["metadata"]["transversalValue"], 24);

    store
        .restore(CanonicalCategory::Validation, &archives[0])
        .expect("restore");
    assert_eq!(live_bytes(&store, CanonicalCategory::Validation), first);
    assert_eq!(store.list_archives(CanonicalCategory::Validation).expect("archives").len(), 2);
}

#[test]
fn archive_paths_are_dated() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path());
    for n in 0..3 {
        store
            .update_category(CanonicalCategory::Analysis, json!({"insights": vec!["x"; n]}))
            .expect("update");
    }
    let archives = store.list_archives(CanonicalCategory::Analysis).expect("archives");
    assert_eq!(archives.len(), 2);
    for path in &archives {
        let rel = path
            .strip_prefix(store.config().archive_dir())
            .expect("under archive dir");
        let mut parts = rel.components();
        assert_eq!(parts.next().expect("year").as_os_str(), "2026");
        assert_eq!(parts.next().expect("month").as_os_str(), "10");
        let name = parts.next().expect("file").as_os_str().to_string_lossy().into_owned();
        assert!(name.starts_with("analysis-2026-10-18T09-30-"), "{name}");
        assert!(name.ends_with(".json"));
    }
    // Archives never change once written.
    let first = fs::read(&archives[0]).expect("read");
    store
        .update_category(CanonicalCategory::Analysis, json!({"summary": "more"}))
        .expect("update");
    assert_eq!(fs::read(&archives[0]).expect("read"), first);
}

#[test]
fn categories_are_independent() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path());
    store
        .update_category(CanonicalCategory::Test, json!({"results": {"passed": 10}}))
        .expect("test");
    store
        .update_category(CanonicalCategory::Footprint, json!({"metrics": {"bytes": 1024}}))
        .expect("footprint");
    store
        .update_category(CanonicalCategory::Test, json!({"results": {"passed": 11}}))
        .expect("test again");

    assert_eq!(
        store.categories(),
        vec![CanonicalCategory::Test, CanonicalCategory::Footprint]
    );
    assert_eq!(store.list_archives(CanonicalCategory::Test).expect("a").len(), 1);
    assert!(store.list_archives(CanonicalCategory::Footprint).expect("a").is_empty());
}

#[test]
fn concurrent_updates_to_one_category_archive_every_version() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let stores: Vec<FossilStore> = (0..4).map(|_| open_store(tmp.path())).collect();

    thread::scope(|s| {
        for (i, store) in stores.iter().enumerate() {
            s.spawn(move || {
                store
                    .update_category(CanonicalCategory::Performance, json!({"writer": i}))
                    .expect("update");
            });
        }
    });

    let store = &stores[0];
    let archives = store.list_archives(CanonicalCategory::Performance).expect("archives");
    assert_eq!(archives.len(), 3);
    let live = store
        .get_category(CanonicalCategory::Performance)
        .expect("get")
        .expect("present");
    assert_eq!(live["metadata"]["version"], 4);
    let mut versions: Vec<u64> = archives
        .iter()
        .map(|p| {
            let v: Value = serde_json::from_slice(&fs::read(p).expect("read")).expect("json");
            v["metadata"]["version"].as_u64().expect("version")
        })
        .collect();
    versions.sort();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[test]
fn aggregate_snapshot_is_yaml_and_sums_values() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path());
    store
        .update_category(CanonicalCategory::Validation, json!({"status": "pass", "summary": "green"}))
        .expect("validation");
    store
        .update_category(CanonicalCategory::Test, json!({"status": "pass", "results": [1, 2]}))
        .expect("test");

    let w = store.generate_aggregate_snapshot().expect("snapshot");
    assert_eq!(w.path, store.config().canonical_dir().join("context.yml"));

    let ctx = store
        .get_category(CanonicalCategory::Context)
        .expect("get")
        .expect("present");
    assert_eq!(ctx["categories_present"], 2);
    assert_eq!(ctx["total_transversal_value"], 70);
    assert_eq!(ctx["commit_hash"], "9f2c1e7");
    assert_eq!(ctx["categories"]["validation"]["summary"], "green");
    assert_eq!(ctx["categories"]["test"]["transversal_value"], 35);
    assert!(ctx["categories"]["test"]["last_updated"].is_string());

    store.generate_aggregate_snapshot().expect("snapshot again");
    assert_eq!(store.list_archives(CanonicalCategory::Context).expect("a").len(), 1);
}

#[test]
fn aggregate_over_empty_store_has_no_categories() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path());
    store.generate_aggregate_snapshot().expect("snapshot");
    let ctx = store
        .get_category(CanonicalCategory::Context)
        .expect("get")
        .expect("present");
    assert_eq!(ctx["categories_present"], 0);
    assert_eq!(ctx["total_transversal_value"], 0);
}
