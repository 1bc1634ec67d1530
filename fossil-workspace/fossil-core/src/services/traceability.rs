// src/services/traceability.rs
//! Traceability tracker: correlates working-tree changes under the fossil
//! root with version-control state, stored as the `traceability` canonical
//! category so it inherits archive-before-overwrite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::Result;
use crate::fossil::CanonicalCategory;
use crate::services::canonical::{CanonicalManager, CanonicalWrite};
use crate::utils::logbook::Logbook;
use crate::utils::path as pathutil;
use crate::vcs::{FileChange, VersionControl};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceabilityRecord {
    pub recorded_at: DateTime<Utc>,
    pub fossil_prefix: String,
    pub staged: Vec<FileChange>,
    pub unstaged: Vec<FileChange>,
    pub change_types: BTreeMap<String, usize>,
    pub total_changes: usize,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceabilityReport {
    pub record: TraceabilityRecord,
    pub write: CanonicalWrite,
}

pub struct TraceabilityTracker {
    configured_prefix: Option<PathBuf>,
    root_name: PathBuf,
    /// Store bookkeeping that changes on every operation, root-relative.
    internal: Vec<PathBuf>,
    vcs: Arc<dyn VersionControl>,
    clock: Arc<dyn Clock>,
    logbook: Logbook,
}

impl TraceabilityTracker {
    pub fn new(cfg: &StoreConfig, vcs: Arc<dyn VersionControl>, clock: Arc<dyn Clock>) -> Self {
        let internal = [cfg.locks_dir().to_path_buf(), cfg.logbook.file.clone(), cfg.versions_dir()]
            .into_iter()
            .filter_map(|p| p.strip_prefix(&cfg.root).ok().map(Path::to_path_buf))
            .collect();
        Self {
            configured_prefix: cfg.traceability.path_prefix.clone(),
            root_name: cfg.root.file_name().map(PathBuf::from).unwrap_or_default(),
            internal,
            vcs,
            clock,
            logbook: Logbook::from_config(cfg),
        }
    }

    /// Repository-relative path the tracker filters on: the configured
    /// prefix, else what version control reports for the fossil root, else
    /// the root's directory name.
    pub fn prefix(&self) -> PathBuf {
        if let Some(prefix) = &self.configured_prefix {
            return prefix.clone();
        }
        match self.vcs.workdir_prefix() {
            Ok(Some(prefix)) => prefix,
            Ok(None) => self.root_name.clone(),
            Err(e) => {
                tracing::debug!(error = %e, "workdir prefix unavailable; using root directory name");
                self.root_name.clone()
            }
        }
    }

    /// Record fossil-path changes through `canonical`.
    ///
    /// Returns `Ok(None)` without writing when nothing under the prefix
    /// changed.
    pub fn record(&self, canonical: &CanonicalManager) -> Result<Option<TraceabilityReport>> {
        let prefix = self.prefix();
        let staged = self.under_prefix(&prefix, self.vcs.staged_files()?);
        let unstaged = self.under_prefix(&prefix, self.vcs.unstaged_files()?);
        if staged.is_empty() && unstaged.is_empty() {
            tracing::debug!(prefix = %prefix.display(), "no fossil changes; traceability not recorded");
            return Ok(None);
        }

        let mut change_types: BTreeMap<String, usize> = BTreeMap::new();
        for change in staged.iter().chain(&unstaged) {
            *change_types.entry(change.kind.as_str().to_string()).or_default() += 1;
        }
        let total_changes = staged.len() + unstaged.len();
        let record = TraceabilityRecord {
            recorded_at: self.clock.now(),
            fossil_prefix: prefix.to_string_lossy().into_owned(),
            summary: summarize(staged.len(), unstaged.len(), &change_types),
            staged,
            unstaged,
            change_types,
            total_changes,
        };

        let mut payload = serde_json::to_value(&record)?;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("status".into(), json!("changes_detected"));
        }
        let write = canonical.update(CanonicalCategory::Traceability, payload)?;

        tracing::info!(total_changes, version = write.version, "traceability recorded");
        self.logbook.emit(
            "traceability_recorded",
            json!({
                "total_changes": total_changes,
                "change_types": record.change_types,
                "version": write.version,
            }),
            &record.recorded_at.to_rfc3339(),
        );
        Ok(Some(TraceabilityReport { record, write }))
    }

    /// Changes under `prefix`, minus locks, logbook and version marks.
    fn under_prefix(&self, prefix: &Path, changes: Vec<FileChange>) -> Vec<FileChange> {
        changes
            .into_iter()
            .filter(|c| pathutil::is_under(&c.path, prefix))
            .filter(|c| {
                !self
                    .internal
                    .iter()
                    .any(|i| pathutil::is_under(&c.path, &prefix.join(i)))
            })
            .collect()
    }
}

fn summarize(staged: usize, unstaged: usize, kinds: &BTreeMap<String, usize>) -> String {
    let breakdown = kinds
        .iter()
        .map(|(kind, n)| format!("{n} {kind}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} fossil change(s) ({staged} staged, {unstaged} unstaged): {breakdown}",
        staged + unstaged
    )
}
