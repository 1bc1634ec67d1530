// tests/query_tests.rs
// Query engine over a real entries/ tree.

use chrono::{Duration, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;

use fossil_core::{
    FossilStore, FossilType, ManualClock, NewFossil, QueryFilter, StaticVcs, StoreConfig,
};

fn open_store(root: &Path, cfg: impl FnOnce(&mut StoreConfig)) -> FossilStore {
    let mut config = StoreConfig::at(root);
    cfg(&mut config);
    let clock = ManualClock::stepping(
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        Duration::minutes(1),
    );
    FossilStore::open(config, Arc::new(StaticVcs::new("c0ffee", "main")), Arc::new(clock))
        .expect("open store")
}

// Created one minute apart, in this order.
fn seed(store: &FossilStore) -> Vec<String> {
    let rows = [
        ("insight", "Open issues", "12 open issues in repo X", &["github"][..]),
        ("decision", "Freeze main", "no merges during release week", &["release"][..]),
        ("insight", "Flaky CI", "retry flaky jobs twice", &["ci", "github"][..]),
        ("observation", "Disk usage", "runner disk at 80%", &["ci"][..]),
        ("insight", "Review latency", "median review takes 2 days", &[][..]),
    ];
    rows.iter()
        .map(|(kind, title, content, tags)| {
            store
                .create(&NewFossil::new(*kind, *title, *content).with_tags(tags.iter().copied()), None)
                .expect("seed")
                .into_entry()
                .id
        })
        .collect()
}

fn titles(page: &fossil_core::QueryPage) -> Vec<&str> {
    page.entries.iter().map(|e| e.title.as_str()).collect()
}

#[test]
fn insight_page_of_two_is_newest_first() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path(), |_| {});
    seed(&store);

    let page = store
        .query(&QueryFilter::of_type(FossilType::Insight).page(2, 0))
        .expect("query");
    assert_eq!(titles(&page), vec!["Review latency", "Flaky CI"]);
    assert!(page.entries.iter().all(|e| e.kind == FossilType::Insight));
    assert_eq!(page.total, 3);
    assert!(page.has_more);

    let next = store
        .query(&QueryFilter::of_type(FossilType::Insight).page(2, 2))
        .expect("query");
    assert_eq!(titles(&next), vec!["Open issues"]);
    assert!(!next.has_more);
}

#[test]
fn filters_combine_with_and() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path(), |_| {});
    seed(&store);

    let f = QueryFilter::default().with_tags(["ci", "release"]);
    assert_eq!(
        titles(&store.query(&f).expect("query")),
        vec!["Disk usage", "Flaky CI", "Freeze main"]
    );

    let f = QueryFilter::of_type(FossilType::Insight)
        .with_tags(["github"])
        .with_search("FLAKY");
    assert_eq!(titles(&store.query(&f).expect("query")), vec!["Flaky CI"]);
}

#[test]
fn date_range_and_oldest_first() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path(), |_| {});
    let ids = seed(&store);
    let created_at = |i: usize| store.get(&ids[i]).expect("get").expect("present").created_at;

    let from = created_at(1);
    let to = created_at(3);
    let f = QueryFilter::default()
        .created_between(Some(from), Some(to))
        .oldest_first();
    assert_eq!(
        titles(&store.query(&f).expect("query")),
        vec!["Freeze main", "Flaky CI", "Disk usage"]
    );

    let f = QueryFilter::default().created_between(None, Some(from));
    assert_eq!(store.query(&f).expect("query").total, 2);
}

#[test]
fn configured_limits_apply() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path(), |c| {
        c.query.default_limit = 2;
        c.query.max_limit = 4;
    });
    seed(&store);

    let page = store.query(&QueryFilter::default()).expect("query");
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.limit, 2);

    let page = store.query(&QueryFilter::default().page(50, 0)).expect("query");
    assert_eq!(page.entries.len(), 4);
    assert_eq!(page.total, 5);
}

#[test]
fn queries_do_not_mutate() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path(), |_| {});
    seed(&store);
    let before = store.list().expect("list");
    for _ in 0..3 {
        store.query(&QueryFilter::default().with_search("issues")).expect("query");
    }
    assert_eq!(store.list().expect("list"), before);
}

#[test]
fn stats_reflect_store_contents() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = open_store(tmp.path(), |_| {});
    let ids = seed(&store);
    store.delete(&ids[1]).expect("delete");

    let stats = store.stats().expect("stats");
    assert_eq!(stats.total, 4);
    assert_eq!(stats.by_type.get("insight"), Some(&3));
    assert_eq!(stats.by_type.get("decision"), None);
    assert_eq!(stats.by_tag.get("github"), Some(&2));
    assert_eq!(stats.by_tag.get("ci"), Some(&2));
    assert!(stats.last_updated.is_some());
}
