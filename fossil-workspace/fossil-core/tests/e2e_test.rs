// tests/e2e_test.rs
// End-to-end: init -> entries -> canonical -> traceability -> context,
// then reopen from fossil.toml and check the logbook trail.

use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use fossil_core::{
    CanonicalCategory, ChangeKind, FileChange, FossilPatch, FossilStore, ManualClock, NewFossil,
    QueryFilter, StaticVcs, StoreConfig,
};

#[test]
fn full_store_lifecycle() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path().join(".fossils");
    let vcs = Arc::new(StaticVcs::new("e2e0001", "main"));
    let clock = Arc::new(ManualClock::stepping(
        Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap(),
        Duration::seconds(5),
    ));

    let store = FossilStore::open(StoreConfig::at(&root), vcs.clone(), clock.clone())
        .expect("open store");
    assert!(store.init_report().created.contains(&"fossil.toml".to_string()));
    for dir in ["entries", "canonical", "archive", ".locks"] {
        assert!(root.join(dir).is_dir(), "{dir} missing");
    }

    // Entries
    let first = store
        .create_deduplicated(
            &NewFossil::new("insight", "Open issues", "12 open issues in repo X")
                .with_tags(["github"])
                .with_source("terminal")
                .with_metadata("repo", json!("X")),
        )
        .expect("create")
        .into_entry();
    let dup = store
        .create_deduplicated(&NewFossil::new("insight", "Open issues", "12 open issues in repo X"))
        .expect("dedup");
    assert!(!dup.is_created());
    store
        .update(&first.id, &FossilPatch::content("14 open issues in repo X"))
        .expect("update");

    let page = store
        .query(&QueryFilter::default().with_tags(["github"]))
        .expect("query");
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].version, 2);
    assert_eq!(page.entries[0].metadata["repo"], "X");

    // Canonical + auto traceability
    vcs.set_unstaged(vec![FileChange::new(
        ".fossils/canonical/performance.json",
        ChangeKind::Untracked,
    )]);
    store
        .update_category(CanonicalCategory::Performance, json!({"metrics": {"build_s": 41}}))
        .expect("perf v1");
    store
        .update_category(CanonicalCategory::Performance, json!({"metrics": {"build_s": 38}}))
        .expect("perf v2");
    assert_eq!(store.list_archives(CanonicalCategory::Performance).expect("a").len(), 1);
    assert_eq!(store.list_archives(CanonicalCategory::Traceability).expect("a").len(), 1);

    let ctx = store.generate_aggregate_snapshot().expect("snapshot");
    let text = fs::read_to_string(&ctx.path).expect("read context");
    assert!(text.contains("performance:"));
    assert!(text.contains("traceability:"));

    // Reopen from disk with the written config.
    drop(store);
    let reopened = FossilStore::open(StoreConfig::load(&root).expect("load config"), vcs, clock)
        .expect("reopen");
    assert!(reopened.init_report().created.is_empty());
    let entry = reopened.get(&first.id).expect("get").expect("present");
    assert_eq!(entry.content, "14 open issues in repo X");
    assert_eq!(entry.previous_versions[0].content, "12 open issues in repo X");
    reopened.delete(&first.id).expect("delete");

    // Logbook trail
    let log = fs::read_to_string(root.join("logbook.jsonl")).expect("read logbook");
    let events: BTreeSet<String> = log
        .lines()
        .map(|l| serde_json::from_str::<Value>(l).expect("json line"))
        .map(|v| v["event"].as_str().expect("event").to_string())
        .collect();
    for expected in [
        "store_init",
        "entry_created",
        "entry_deduplicated",
        "entry_updated",
        "entry_deleted",
        "canonical_archived",
        "canonical_updated",
        "traceability_recorded",
        "aggregate_generated",
    ] {
        assert!(events.contains(expected), "missing {expected} in {events:?}");
    }
}
