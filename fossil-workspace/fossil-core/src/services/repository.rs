// src/services/repository.rs
//! Fossil repository: one JSON file per entry under `entries/{id}.json`.
//!
//! - Every write goes through `write_atomic` (temp file + fsync + rename).
//! - `create`, `update` and `delete` hold the `entries` lock so the dedup scan
//!   and the insert it guards happen as one step.
//! - Bulk reads skip corrupt files with a warning.

use serde_json::json;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::{FossilError, Result};
use crate::faults::FaultPoint;
use crate::fossil::{content_hash, FossilEntry, FossilPatch, NewFossil, VersionSnapshot};
use crate::services::similarity::{SimilarMatch, SimilarityEngine};
use crate::services::validator::{self, Validator};
use crate::utils::fsio;
use crate::utils::lock::LockGuard;
use crate::utils::logbook::{self, Logbook};
use crate::utils::path as pathutil;

const ENTRIES_LOCK: &str = "entries";

/// Result of `create`.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(FossilEntry),
    /// A stored entry scored at or above the threshold; nothing was written.
    Deduplicated { existing: FossilEntry, score: f64 },
}

impl CreateOutcome {
    pub fn entry(&self) -> &FossilEntry {
        match self {
            CreateOutcome::Created(e) => e,
            CreateOutcome::Deduplicated { existing, .. } => existing,
        }
    }

    pub fn into_entry(self) -> FossilEntry {
        match self {
            CreateOutcome::Created(e) => e,
            CreateOutcome::Deduplicated { existing, .. } => existing,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

pub struct FossilRepository {
    entries_dir: PathBuf,
    locks_dir: PathBuf,
    default_threshold: f64,
    validator: Validator,
    similarity: SimilarityEngine,
    clock: Arc<dyn Clock>,
    logbook: Logbook,
}

impl FossilRepository {
    pub fn open(cfg: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let entries_dir = cfg.entries_dir().to_path_buf();
        fs::create_dir_all(&entries_dir).map_err(|e| FossilError::io(&entries_dir, e))?;
        Ok(Self {
            entries_dir,
            locks_dir: cfg.locks_dir().to_path_buf(),
            default_threshold: cfg.dedup.threshold,
            validator: Validator::new(cfg.canonical.default_author.clone()),
            similarity: SimilarityEngine::from_config(&cfg.dedup),
            clock,
            logbook: Logbook::from_config(cfg),
        })
    }

    pub fn entries_dir(&self) -> &Path {
        &self.entries_dir
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    /// Validate and insert `candidate`.
    ///
    /// With `Some(threshold)`, an existing entry scoring `>= threshold`
    /// against the candidate's `(title, content)` is returned instead of
    /// writing a new one. `None` skips the dedup check.
    pub fn create(&self, candidate: &NewFossil, dedup_threshold: Option<f64>) -> Result<CreateOutcome> {
        let valid = self.validator.validate(candidate)?;
        let threshold = dedup_threshold.map(validator::check_threshold).transpose()?;

        let _lock = LockGuard::acquire(&self.locks_dir, ENTRIES_LOCK)?;

        if let Some(threshold) = threshold {
            let corpus = self.scan()?;
            let hash = content_hash(&valid.title, &valid.content);
            let exact = corpus
                .iter()
                .filter(|e| e.content_hash == hash)
                .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| b.id.cmp(&a.id)))
                .cloned();
            let hit = match exact {
                Some(existing) => Some(SimilarMatch {
                    entry: existing,
                    score: 100.0,
                }),
                None => self
                    .similarity
                    .best_match(&corpus, &valid.title, &valid.content, threshold),
            };
            if let Some(hit) = hit {
                tracing::info!(
                    id = %hit.entry.id,
                    score = hit.score,
                    threshold,
                    "candidate deduplicated against existing entry"
                );
                self.logbook.emit(
                    "entry_deduplicated",
                    json!({
                        "existing_id": hit.entry.id,
                        "score": hit.score,
                        "threshold": threshold,
                        "title": logbook::preview(&valid.title, 80),
                    }),
                    &self.clock.now().to_rfc3339(),
                );
                return Ok(CreateOutcome::Deduplicated {
                    existing: hit.entry,
                    score: hit.score,
                });
            }
        }

        let now = self.clock.now();
        let mut id = Uuid::new_v4().to_string();
        while self.entry_path(&id).exists() {
            id = Uuid::new_v4().to_string();
        }
        let entry = FossilEntry {
            content_hash: content_hash(&valid.title, &valid.content),
            id,
            kind: valid.kind,
            title: valid.title,
            content: valid.content,
            tags: valid.tags,
            source: valid.source,
            created_by: valid.created_by,
            created_at: now,
            updated_at: now,
            version: 1,
            previous_versions: Vec::new(),
            metadata: valid.metadata,
        };
        self.write_entry(&entry)?;

        tracing::info!(id = %entry.id, kind = %entry.kind, "entry created");
        self.logbook.emit(
            "entry_created",
            json!({
                "id": entry.id,
                "type": entry.kind,
                "title": logbook::preview(&entry.title, 80),
                "tags": entry.tags,
            }),
            &now.to_rfc3339(),
        );
        Ok(CreateOutcome::Created(entry))
    }

    /// `create` with the configured default threshold.
    pub fn create_deduplicated(&self, candidate: &NewFossil) -> Result<CreateOutcome> {
        self.create(candidate, Some(self.default_threshold))
    }

    /// Read one entry. Unknown ids, malformed ids and corrupt files all read
    /// as `Ok(None)`; a corrupt file also logs a warning.
    pub fn get(&self, id: &str) -> Result<Option<FossilEntry>> {
        if !pathutil::is_valid_id(id) {
            return Ok(None);
        }
        let path = self.entry_path(id);
        let Some(bytes) = fsio::read_optional(&path)? else {
            return Ok(None);
        };
        match serde_json::from_slice::<FossilEntry>(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt entry treated as absent");
                Ok(None)
            }
        }
    }

    /// Apply `patch`. A changed title or content snapshots the prior title
    /// and content into `previousVersions` and bumps `version`.
    pub fn update(&self, id: &str, patch: &FossilPatch) -> Result<FossilEntry> {
        pathutil::check_id(id)?;
        let _lock = LockGuard::acquire(&self.locks_dir, ENTRIES_LOCK)?;

        let mut entry = self.load_for_write(id)?;
        if patch.is_empty() {
            return Ok(entry);
        }

        let now = self.clock.now();
        let new_title = patch.title.as_deref().map(str::trim);
        let title_changed = new_title.is_some_and(|t| t != entry.title);
        let content_changed = patch
            .content
            .as_deref()
            .is_some_and(|c| c != entry.content);

        if title_changed || content_changed {
            entry.previous_versions.push(VersionSnapshot {
                version: entry.version,
                title: entry.title.clone(),
                content: entry.content.clone(),
                updated_at: entry.updated_at,
            });
            entry.version += 1;
        }
        if let Some(title) = new_title {
            entry.title = title.to_string();
        }
        if let Some(content) = &patch.content {
            entry.content = content.clone();
        }
        if let Some(tags) = &patch.tags {
            entry.tags = validator::normalize_tags(tags)?;
        }
        if let Some(meta) = &patch.metadata {
            for (k, v) in meta {
                if v.is_null() {
                    entry.metadata.remove(k);
                } else {
                    entry.metadata.insert(k.clone(), v.clone());
                }
            }
        }
        entry.content_hash = content_hash(&entry.title, &entry.content);
        entry.updated_at = now.max(entry.updated_at);

        self.validator.validate_entry(&entry)?;
        self.write_entry(&entry)?;

        tracing::info!(id, version = entry.version, "entry updated");
        self.logbook.emit(
            "entry_updated",
            json!({
                "id": entry.id,
                "version": entry.version,
                "content_changed": title_changed || content_changed,
            }),
            &now.to_rfc3339(),
        );
        Ok(entry)
    }

    /// Hard delete. There is no tombstone and no undo.
    pub fn delete(&self, id: &str) -> Result<()> {
        pathutil::check_id(id)?;
        let _lock = LockGuard::acquire(&self.locks_dir, ENTRIES_LOCK)?;
        let path = self.entry_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FossilError::NotFound {
                    kind: "entry",
                    id: id.to_string(),
                })
            }
            Err(e) => return Err(FossilError::io(&path, e)),
        }
        tracing::info!(id, "entry deleted");
        self.logbook
            .emit("entry_deleted", json!({ "id": id }), &self.clock.now().to_rfc3339());
        Ok(())
    }

    /// Every readable entry, in file-name order.
    pub fn list(&self) -> Result<Vec<FossilEntry>> {
        self.scan()
    }

    /// Rank stored entries against `(title, content)` without writing.
    pub fn find_similar(&self, title: &str, content: &str, threshold: f64) -> Result<Vec<SimilarMatch>> {
        let threshold = validator::check_threshold(threshold)?;
        let corpus = self.scan()?;
        Ok(self.similarity.find_similar(&corpus, title, content, threshold))
    }

    pub(crate) fn scan(&self) -> Result<Vec<FossilEntry>> {
        let mut out = Vec::new();
        for path in fsio::list_files_with_ext(&self.entries_dir, "json")? {
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                // Deleted between listing and read.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            match serde_json::from_slice::<FossilEntry>(&bytes) {
                Ok(entry) => out.push(entry),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt entry");
                }
            }
        }
        Ok(out)
    }

    fn load_for_write(&self, id: &str) -> Result<FossilEntry> {
        let path = self.entry_path(id);
        let bytes = fsio::read_optional(&path)?.ok_or_else(|| FossilError::NotFound {
            kind: "entry",
            id: id.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|source| FossilError::Parse { path, source })
    }

    fn write_entry(&self, entry: &FossilEntry) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entry)?;
        fsio::write_atomic(
            &self.entry_path(&entry.id),
            &bytes,
            Some(FaultPoint::AfterEntryTempWrite),
        )
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        self.entries_dir.join(format!("{id}.json"))
    }
}
