// fossil-core/src/commands/init.rs

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use crate::clock::Clock;
use crate::config::{StoreConfig, CONFIG_FILE};
use crate::error::{FossilError, Result};
use crate::utils::fsio::write_atomic;

#[derive(Debug, Clone)]
pub struct InitReport {
    pub root: PathBuf,
    pub created: Vec<String>,
    pub existed: Vec<String>,
}

/// Create the fossil root layout. Idempotent; safe to call on every open.
/// `clock` stamps the seeded `store_init` event.
pub fn ensure_initialized(cfg: &StoreConfig, clock: &dyn Clock) -> Result<InitReport> {
    let root = cfg.root.clone();
    let mut created = Vec::new();
    let mut existed = Vec::new();

    // Directories
    ensure_dir(&root, &root, &mut created, &mut existed)?;
    for dir in [cfg.entries_dir(), cfg.canonical_dir(), cfg.archive_dir(), cfg.locks_dir()] {
        ensure_dir(&root, dir, &mut created, &mut existed)?;
    }

    // Config
    ensure_file(
        &root,
        &root.join(CONFIG_FILE),
        DEFAULT_CONFIG_TOML,
        &mut created,
        &mut existed,
    )?;

    // Logbook
    if cfg.logbook.enabled && cfg.logbook.file.exists() {
        existed.push(label(&root, &cfg.logbook.file));
    } else if cfg.logbook.enabled {
        let init_event = json!({
            "timestamp": clock.now().to_rfc3339(),
            "event": "store_init",
            "data": { "root": root.display().to_string() },
        });
        ensure_file(
            &root,
            &cfg.logbook.file,
            &format!("{init_event}\n"),
            &mut created,
            &mut existed,
        )?;
    }

    tracing::debug!(root = %root.display(), created = created.len(), "fossil root initialized");
    Ok(InitReport { root, created, existed })
}

fn ensure_dir(root: &Path, dir: &Path, created: &mut Vec<String>, existed: &mut Vec<String>) -> Result<()> {
    if dir.is_dir() {
        existed.push(label(root, dir));
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| FossilError::io(dir, e))?;
    created.push(label(root, dir));
    Ok(())
}

fn ensure_file(
    root: &Path,
    path: &Path,
    content_if_absent: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    if path.exists() {
        existed.push(label(root, path));
        return Ok(());
    }
    write_atomic(path, content_if_absent.as_bytes(), None)?;
    created.push(label(root, path));
    Ok(())
}

fn label(root: &Path, p: &Path) -> String {
    match p.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => p.display().to_string(),
    }
}

// ---------- defaults ----------

pub(crate) const DEFAULT_CONFIG_TOML: &str = r#"[layout]
entries_dir = "entries"
canonical_dir = "canonical"
archive_dir = "archive"
locks_dir = ".locks"

[dedup]
# Score (0-100) at or above which a new entry is treated as a duplicate.
threshold = 80.0
title_weight = 3
content_weight = 7

[query]
default_limit = 20
max_limit = 500

[canonical]
default_author = "fossil-store"
default_email = "unknown"

[traceability]
# Repository-relative path of this fossil root; defaults to what git reports.
# path_prefix = ".fossils"
auto_record = true

[logbook]
enabled = true
file = "logbook.jsonl"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 7, 0, 0).unwrap())
    }

    #[test]
    fn second_run_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StoreConfig::at(dir.path().join(".fossils"));
        let first = ensure_initialized(&cfg, &clock()).unwrap();
        assert!(first.created.contains(&"entries".to_string()));
        assert!(first.created.contains(&CONFIG_FILE.to_string()));
        assert!(first.created.contains(&"logbook.jsonl".to_string()));

        let second = ensure_initialized(&cfg, &clock()).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existed.len(), first.created.len());
    }

    #[test]
    fn default_config_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        ensure_initialized(&StoreConfig::at(dir.path()), &clock()).unwrap();
        let cfg = StoreConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.dedup.threshold, 80.0);
        assert_eq!(cfg.query.max_limit, 500);
        assert_eq!(cfg.locks_dir(), dir.path().join(".locks"));
        assert!(cfg.traceability.path_prefix.is_none());
    }

    #[test]
    fn init_event_uses_injected_clock() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StoreConfig::at(dir.path());
        ensure_initialized(&cfg, &clock()).unwrap();
        let text = std::fs::read_to_string(&cfg.logbook.file).unwrap();
        let event: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(event["event"], "store_init");
        assert_eq!(event["timestamp"], "2026-10-18T07:00:00+00:00");
    }
}
