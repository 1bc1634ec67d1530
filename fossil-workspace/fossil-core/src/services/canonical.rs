// src/services/canonical.rs
//! Canonical manager: one stable-named live file per category, archived before
//! every overwrite.
//!
//! - Live files: `<canonical>/{category}.json` (`context.yml` for the aggregate).
//! - Archives: `<archive>/{YYYY}/{MM}/{category}-{stamp}.{ext}`, created with
//!   create-new semantics and fsynced before the live file is touched.
//! - Each category is serialized by its own lock in `<locks>/{category}.lock`.
//! - `<canonical>/.versions/{category}.json` holds the highest version issued,
//!   so versions keep rising across restores.
//!
//! Update flow:
//!   lock → read live → archive live (if any) → bump version → envelope →
//!   atomic overwrite

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::clock::{self, Clock};
use crate::config::StoreConfig;
use crate::error::{FossilError, Result};
use crate::faults::{self, FaultPoint};
use crate::fossil::CanonicalCategory;
use crate::utils::fsio;
use crate::utils::lock::LockGuard;
use crate::utils::logbook::Logbook;
use crate::vcs::VersionControl;

const UNKNOWN: &str = "unknown";
const MAX_ARCHIVE_SUFFIX: u32 = 1000;

const TRANSVERSAL_BASE: u64 = 20;
const TRANSVERSAL_SUMMARY: u64 = 15;
const TRANSVERSAL_PER_STEP: u64 = 2;
const TRANSVERSAL_PER_INSIGHT: u64 = 3;
const TRANSVERSAL_METRICS: u64 = 15;
const TRANSVERSAL_RESULTS: u64 = 15;
const TRANSVERSAL_CAP: u64 = 100;

/// Outcome of a write to a live canonical file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalWrite {
    pub category: CanonicalCategory,
    pub path: PathBuf,
    /// Archived copy of the previous live file, if there was one.
    pub archived: Option<PathBuf>,
    pub version: u64,
}

/// Per-category digest inside the aggregate context snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDigest {
    pub last_updated: Option<String>,
    pub status: String,
    pub transversal_value: u64,
    pub summary: Option<Value>,
}

/// The aggregate cross-category view written to `context.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub generated_at: DateTime<Utc>,
    pub commit_hash: String,
    pub branch: String,
    pub version: u64,
    pub total_transversal_value: u64,
    pub categories_present: usize,
    pub categories: BTreeMap<String, CategoryDigest>,
}

/// Sidecar in `<canonical>/.versions/`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct VersionMark {
    highest_issued: u64,
}

pub struct CanonicalManager {
    canonical_dir: PathBuf,
    archive_dir: PathBuf,
    locks_dir: PathBuf,
    versions_dir: PathBuf,
    default_author: String,
    default_email: String,
    vcs: Arc<dyn VersionControl>,
    clock: Arc<dyn Clock>,
    logbook: Logbook,
}

impl CanonicalManager {
    pub fn open(cfg: &StoreConfig, vcs: Arc<dyn VersionControl>, clock: Arc<dyn Clock>) -> Result<Self> {
        let canonical_dir = cfg.canonical_dir().to_path_buf();
        let archive_dir = cfg.archive_dir().to_path_buf();
        for dir in [&canonical_dir, &archive_dir] {
            fs::create_dir_all(dir).map_err(|e| FossilError::io(dir, e))?;
        }
        Ok(Self {
            canonical_dir,
            archive_dir,
            locks_dir: cfg.locks_dir().to_path_buf(),
            versions_dir: cfg.versions_dir(),
            default_author: cfg.canonical.default_author.clone(),
            default_email: cfg.canonical.default_email.clone(),
            vcs,
            clock,
            logbook: Logbook::from_config(cfg),
        })
    }

    pub fn live_path(&self, category: CanonicalCategory) -> PathBuf {
        self.canonical_dir.join(category.file_name())
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Replace the live file for `category` with `payload` plus the envelope.
    ///
    /// # Arguments
    /// * `category` - any category except `context`, which only
    ///   [`generate_aggregate_snapshot`](Self::generate_aggregate_snapshot) writes.
    /// * `payload`  - a JSON object; its own `metadata` keys survive unless they
    ///   collide with envelope keys.
    ///
    /// # Behavior
    /// - Archives the current live file byte-for-byte and fsyncs it first.
    ///   If archiving fails the live file is left untouched.
    /// - `metadata.version` is one above the highest version ever issued for
    ///   the category, restores included (1 for a fresh category).
    /// - Version-control lookups that fail are recorded as `"unknown"`.
    pub fn update(&self, category: CanonicalCategory, payload: Value) -> Result<CanonicalWrite> {
        if category == CanonicalCategory::Context {
            return Err(FossilError::validation(
                "category",
                "context is generated from the other categories and cannot be written directly",
            ));
        }
        let Value::Object(payload) = payload else {
            return Err(FossilError::validation("payload", "must be a JSON object"));
        };
        let transversal = transversal_value(&payload);

        self.replace_live(category, |now, version| {
            let doc = self.envelope(payload, now, version, transversal);
            let mut bytes = serde_json::to_vec_pretty(&doc)?;
            bytes.push(b'\n');
            Ok(bytes)
        })
    }

    /// Live payload for `category`; absent and unparseable files are `None`.
    pub fn get(&self, category: CanonicalCategory) -> Result<Option<Value>> {
        let path = self.live_path(category);
        let Some(bytes) = fsio::read_optional(&path)? else {
            return Ok(None);
        };
        match parse_live(category, &bytes) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt canonical file treated as absent");
                Ok(None)
            }
        }
    }

    /// Categories with a live file on disk.
    pub fn categories(&self) -> Vec<CanonicalCategory> {
        CanonicalCategory::ALL
            .into_iter()
            .filter(|c| self.live_path(*c).is_file())
            .collect()
    }

    /// Archived copies for `category`, oldest first.
    pub fn list_archives(&self, category: CanonicalCategory) -> Result<Vec<PathBuf>> {
        let mut found: Vec<(ArchiveKey, PathBuf)> = Vec::new();
        for year in subdirs(&self.archive_dir)? {
            for month in subdirs(&year)? {
                for path in fsio::list_files_with_ext(&month, category.extension())? {
                    if let Some(key) = archive_key(category, &path) {
                        found.push((key, path));
                    }
                }
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, p)| p).collect())
    }

    /// Make an archived copy live again, archiving the current live file first.
    ///
    /// The live file gets the archived bytes unchanged. The returned version
    /// is freshly issued, so the next update continues above it rather than
    /// above the restored document's own `metadata.version`.
    pub fn restore(&self, category: CanonicalCategory, archive: &Path) -> Result<CanonicalWrite> {
        let archive = if archive.is_absolute() || archive.starts_with(&self.archive_dir) {
            archive.to_path_buf()
        } else {
            self.archive_dir.join(archive)
        };
        let escapes = archive.components().any(|c| matches!(c, Component::ParentDir));
        if escapes || !archive.starts_with(&self.archive_dir) || archive_key(category, &archive).is_none() {
            return Err(FossilError::validation(
                "archive",
                format!("{} is not an archive of {category}", archive.display()),
            ));
        }
        let bytes = fsio::read_optional(&archive)?.ok_or_else(|| FossilError::NotFound {
            kind: "archive",
            id: archive.display().to_string(),
        })?;
        let restored = parse_live(category, &bytes).map_err(|e| match e {
            FossilError::Serialize(source) => FossilError::Parse {
                path: archive.clone(),
                source,
            },
            other => other,
        })?;
        let restored_version = version_of(&restored);

        let write = self.replace_live(category, |_, _| Ok(bytes))?;
        tracing::info!(
            %category,
            from = %archive.display(),
            restored_version,
            version = write.version,
            "canonical restored from archive"
        );
        self.logbook.emit(
            "canonical_restored",
            json!({
                "category": category,
                "archive": archive,
                "restored_version": restored_version,
                "version": write.version,
            }),
            &self.clock.now().to_rfc3339(),
        );
        Ok(write)
    }

    /// Summarize every source category into `context.yml`.
    ///
    /// Unreadable category files are skipped. The previous context file is
    /// archived like any other category.
    pub fn generate_aggregate_snapshot(&self) -> Result<CanonicalWrite> {
        let mut categories = BTreeMap::new();
        for category in CanonicalCategory::SNAPSHOT_SOURCES {
            let Some(doc) = self.get(category)? else {
                tracing::debug!(%category, "no live file; left out of context snapshot");
                continue;
            };
            categories.insert(category.as_str().to_string(), digest(&doc));
        }
        let total_transversal_value = categories.values().map(|d| d.transversal_value).sum();
        let categories_present = categories.len();
        let commit_hash = self.vcs_or_unknown("commit hash", self.vcs.current_commit_hash());
        let branch = self.vcs_or_unknown("branch", self.vcs.current_branch());

        let write = self.replace_live(CanonicalCategory::Context, |now, version| {
            let snapshot = ContextSnapshot {
                generated_at: now,
                commit_hash,
                branch,
                version,
                total_transversal_value,
                categories_present,
                categories,
            };
            Ok(serde_yaml::to_string(&snapshot)?.into_bytes())
        })?;

        self.logbook.emit(
            "aggregate_generated",
            json!({
                "path": write.path,
                "categories_present": categories_present,
                "total_transversal_value": total_transversal_value,
            }),
            &self.clock.now().to_rfc3339(),
        );
        Ok(write)
    }

    /// Lock, archive the current live bytes, issue the next version, then
    /// atomically write what `render` produces for it.
    ///
    /// The version mark is written before the live file: a failed overwrite
    /// leaves a gap in the numbering, never a repeat.
    fn replace_live<F>(&self, category: CanonicalCategory, render: F) -> Result<CanonicalWrite>
    where
        F: FnOnce(DateTime<Utc>, u64) -> Result<Vec<u8>>,
    {
        let _lock = LockGuard::acquire(&self.locks_dir, category.as_str())?;
        let live = self.live_path(category);
        let previous = fsio::read_optional(&live)?;
        let now = self.clock.now();
        let version = self.highest_issued(category, previous.as_deref())? + 1;

        let archived = match &previous {
            Some(bytes) => Some(self.archive(category, bytes, now)?),
            None => None,
        };

        let bytes = render(now, version)?;
        self.mark_issued(category, version)?;
        faults::check(FaultPoint::BeforeCanonicalOverwrite)?;
        fsio::write_atomic(&live, &bytes, None)?;

        tracing::info!(%category, version, path = %live.display(), "canonical file written");
        self.logbook.emit(
            "canonical_updated",
            json!({
                "category": category,
                "path": live,
                "version": version,
                "archived": archived,
            }),
            &now.to_rfc3339(),
        );
        Ok(CanonicalWrite {
            category,
            path: live,
            archived,
            version,
        })
    }

    fn mark_path(&self, category: CanonicalCategory) -> PathBuf {
        self.versions_dir.join(format!("{}.json", category.as_str()))
    }

    /// Highest version issued so far: the mark, or the live file, whichever
    /// is higher. Without a mark the archives are scanned too.
    fn highest_issued(&self, category: CanonicalCategory, live: Option<&[u8]>) -> Result<u64> {
        let live_version = live.map_or(0, |b| bytes_version(category, b));
        let mark = fsio::read_optional(&self.mark_path(category))?
            .and_then(|b| serde_json::from_slice::<VersionMark>(&b).ok());
        if let Some(mark) = mark {
            return Ok(mark.highest_issued.max(live_version));
        }
        let mut highest = live_version;
        for path in self.list_archives(category)? {
            if let Some(bytes) = fsio::read_optional(&path)? {
                highest = highest.max(bytes_version(category, &bytes));
            }
        }
        Ok(highest)
    }

    fn mark_issued(&self, category: CanonicalCategory, version: u64) -> Result<()> {
        let bytes = serde_json::to_vec(&VersionMark { highest_issued: version })?;
        fsio::write_atomic(&self.mark_path(category), &bytes, None)
    }

    fn archive(&self, category: CanonicalCategory, bytes: &[u8], at: DateTime<Utc>) -> Result<PathBuf> {
        let dir = self
            .archive_dir
            .join(format!("{:04}", at.year()))
            .join(format!("{:02}", at.month()));
        let stem = format!("{}-{}", category.as_str(), clock::file_stamp(at));
        let ext = category.extension();

        for n in 0..=MAX_ARCHIVE_SUFFIX {
            let name = if n == 0 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}-{n}.{ext}")
            };
            let path = dir.join(name);
            if fsio::write_new_durable(&path, bytes)? {
                tracing::info!(%category, archive = %path.display(), "previous canonical archived");
                self.logbook.emit(
                    "canonical_archived",
                    json!({ "category": category, "archive": path, "bytes": bytes.len() }),
                    &at.to_rfc3339(),
                );
                return Ok(path);
            }
        }
        Err(FossilError::io(
            dir.join(format!("{stem}.{ext}")),
            std::io::Error::new(ErrorKind::AlreadyExists, "no free archive name"),
        ))
    }

    fn envelope(&self, mut payload: Map<String, Value>, now: DateTime<Utc>, version: u64, transversal: u64) -> Value {
        let commit_hash = self.vcs_or_unknown("commit hash", self.vcs.current_commit_hash());
        let branch = self.vcs_or_unknown("branch", self.vcs.current_branch());
        let (author, email) = match self.vcs.author() {
            Ok(a) => (a.name, a.email),
            Err(e) => {
                tracing::warn!(error = %e, "version control author unavailable; using defaults");
                (self.default_author.clone(), self.default_email.clone())
            }
        };

        let mut metadata = match payload.remove("metadata") {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        };
        metadata.insert("fossilized".into(), Value::Bool(true));
        metadata.insert("canonical".into(), Value::Bool(true));
        metadata.insert("version".into(), json!(version));
        metadata.insert("transversalValue".into(), json!(transversal));

        payload.insert("timestamp".into(), Value::String(now.to_rfc3339()));
        payload.insert("commit_hash".into(), Value::String(commit_hash));
        payload.insert("branch".into(), Value::String(branch));
        payload.insert("author".into(), Value::String(author));
        payload.insert("email".into(), Value::String(email));
        payload.insert("metadata".into(), Value::Object(metadata));
        Value::Object(payload)
    }

    fn vcs_or_unknown(&self, what: &str, looked_up: Result<String>) -> String {
        match looked_up {
            Ok(v) if !v.trim().is_empty() => v,
            Ok(_) => UNKNOWN.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "version control {what} unavailable");
                UNKNOWN.to_string()
            }
        }
    }
}

/// Completeness heuristic in `0..=100`.
///
/// Base 20; `summary` +15; `validation_steps` +2 per element; `insights` +3
/// per element; `metrics` +15; `results` +15. Null fields count as absent.
pub fn transversal_value(payload: &Map<String, Value>) -> u64 {
    let present = |key: &str| payload.get(key).is_some_and(|v| !v.is_null());
    let len = |key: &str| payload.get(key).and_then(Value::as_array).map_or(0, Vec::len) as u64;

    let mut score = TRANSVERSAL_BASE;
    if present("summary") {
        score += TRANSVERSAL_SUMMARY;
    }
    score += TRANSVERSAL_PER_STEP * len("validation_steps");
    score += TRANSVERSAL_PER_INSIGHT * len("insights");
    if present("metrics") {
        score += TRANSVERSAL_METRICS;
    }
    if present("results") {
        score += TRANSVERSAL_RESULTS;
    }
    score.min(TRANSVERSAL_CAP)
}

fn parse_live(category: CanonicalCategory, bytes: &[u8]) -> Result<Value> {
    match category {
        CanonicalCategory::Context => Ok(serde_yaml::from_slice::<Value>(bytes)?),
        _ => Ok(serde_json::from_slice::<Value>(bytes)?),
    }
}

fn version_of(doc: &Value) -> u64 {
    doc.pointer("/metadata/version")
        .or_else(|| doc.get("version"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn bytes_version(category: CanonicalCategory, bytes: &[u8]) -> u64 {
    parse_live(category, bytes).map_or(0, |doc| version_of(&doc))
}

fn digest(doc: &Value) -> CategoryDigest {
    CategoryDigest {
        last_updated: doc.get("timestamp").and_then(Value::as_str).map(str::to_string),
        status: doc
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN)
            .to_string(),
        transversal_value: doc
            .pointer("/metadata/transversalValue")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        summary: doc.get("summary").filter(|v| !v.is_null()).cloned(),
    }
}

// (stamp, collision suffix): orders archives chronologically, with `-1`, `-2`
// after the unsuffixed name.
type ArchiveKey = (String, u32);

fn archive_key(category: CanonicalCategory, path: &Path) -> Option<ArchiveKey> {
    if path.extension().and_then(|e| e.to_str()) != Some(category.extension()) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix(category.as_str())?.strip_prefix('-')?;
    if !rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    match rest.split_once("Z-") {
        Some((stamp, n)) => Some((format!("{stamp}Z"), n.parse().ok()?)),
        None => Some((rest.to_string(), 0)),
    }
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FossilError::io(dir, e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| FossilError::io(dir, e))?.path();
        if path.is_dir() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
