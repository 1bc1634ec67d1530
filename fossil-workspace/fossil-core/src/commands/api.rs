// src/commands/api.rs
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::commands::init::{ensure_initialized, InitReport};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::fossil::{CanonicalCategory, FossilEntry, FossilPatch, NewFossil};
use crate::services::canonical::{CanonicalManager, CanonicalWrite};
use crate::services::query::{QueryEngine, QueryFilter, QueryPage, StoreStats};
use crate::services::repository::{CreateOutcome, FossilRepository};
use crate::services::similarity::SimilarMatch;
use crate::services::traceability::{TraceabilityReport, TraceabilityTracker};
use crate::vcs::{GitCli, VersionControl};

/// Entry point for producers and consumers of a fossil root.
pub struct FossilStore {
    config: StoreConfig,
    init: InitReport,
    repository: FossilRepository,
    canonical: CanonicalManager,
    tracker: TraceabilityTracker,
}

impl FossilStore {
    /// Initialize the layout under `config.root` and wire the services.
    pub fn open(config: StoreConfig, vcs: Arc<dyn VersionControl>, clock: Arc<dyn Clock>) -> Result<Self> {
        let init = ensure_initialized(&config, clock.as_ref())?;
        let repository = FossilRepository::open(&config, clock.clone())?;
        let canonical = CanonicalManager::open(&config, vcs.clone(), clock.clone())?;
        let tracker = TraceabilityTracker::new(&config, vcs, clock);
        Ok(Self {
            config,
            init,
            repository,
            canonical,
            tracker,
        })
    }

    /// Load `<root>/fossil.toml` and use `git` in the root plus the wall clock.
    pub fn open_at(root: impl Into<PathBuf>) -> Result<Self> {
        let config = StoreConfig::load(root)?;
        let vcs = Arc::new(GitCli::new(config.root.clone()));
        Self::open(config, vcs, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn init_report(&self) -> &InitReport {
        &self.init
    }

    // ---------- entries ----------

    pub fn create(&self, candidate: &NewFossil, dedup_threshold: Option<f64>) -> Result<CreateOutcome> {
        self.repository.create(candidate, dedup_threshold)
    }

    /// `create` gated by the configured dedup threshold.
    pub fn create_deduplicated(&self, candidate: &NewFossil) -> Result<CreateOutcome> {
        self.repository.create_deduplicated(candidate)
    }

    pub fn get(&self, id: &str) -> Result<Option<FossilEntry>> {
        self.repository.get(id)
    }

    pub fn update(&self, id: &str, patch: &FossilPatch) -> Result<FossilEntry> {
        self.repository.update(id, patch)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.repository.delete(id)
    }

    pub fn list(&self) -> Result<Vec<FossilEntry>> {
        self.repository.list()
    }

    pub fn query(&self, filter: &QueryFilter) -> Result<QueryPage> {
        self.query_engine().query(filter)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.query_engine().stats()
    }

    pub fn find_similar(&self, title: &str, content: &str, threshold: Option<f64>) -> Result<Vec<SimilarMatch>> {
        let threshold = threshold.unwrap_or(self.config.dedup.threshold);
        self.repository.find_similar(title, content, threshold)
    }

    // ---------- canonical ----------

    /// Archive-then-overwrite the live file for `category`.
    ///
    /// With `traceability.auto_record`, a traceability record follows every
    /// update of another category. A failure there is logged, not returned:
    /// the canonical write has already succeeded.
    pub fn update_category(&self, category: CanonicalCategory, payload: Value) -> Result<CanonicalWrite> {
        let write = self.canonical.update(category, payload)?;
        if self.config.traceability.auto_record && category != CanonicalCategory::Traceability {
            if let Err(e) = self.tracker.record(&self.canonical) {
                tracing::warn!(%category, error = %e, "traceability after canonical update failed");
            }
        }
        Ok(write)
    }

    pub fn get_category(&self, category: CanonicalCategory) -> Result<Option<Value>> {
        self.canonical.get(category)
    }

    pub fn categories(&self) -> Vec<CanonicalCategory> {
        self.canonical.categories()
    }

    pub fn generate_aggregate_snapshot(&self) -> Result<CanonicalWrite> {
        self.canonical.generate_aggregate_snapshot()
    }

    pub fn list_archives(&self, category: CanonicalCategory) -> Result<Vec<PathBuf>> {
        self.canonical.list_archives(category)
    }

    pub fn restore(&self, category: CanonicalCategory, archive: &Path) -> Result<CanonicalWrite> {
        self.canonical.restore(category, archive)
    }

    // ---------- traceability ----------

    pub fn record_traceability(&self) -> Result<Option<TraceabilityReport>> {
        self.tracker.record(&self.canonical)
    }

    fn query_engine(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.repository, self.config.query.clone())
    }
}
