use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FossilError, Result};

pub const CONFIG_FILE: &str = "fossil.toml";
pub const VERSIONS_DIR: &str = ".versions";

/// Store configuration. Passed explicitly into every component; there is no
/// process-wide instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Fossil root. Never read from the file; set by [`StoreConfig::load`] / [`StoreConfig::at`].
    #[serde(skip)]
    pub root: PathBuf,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub canonical: CanonicalConfig,
    #[serde(default)]
    pub traceability: TraceabilityConfig,
    #[serde(default)]
    pub logbook: LogbookConfig,
}

impl StoreConfig {
    /// Defaults rooted at `root`, ignoring any `fossil.toml`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let mut cfg = Self {
            root: root.into(),
            layout: LayoutConfig::default(),
            dedup: DedupConfig::default(),
            query: QueryConfig::default(),
            canonical: CanonicalConfig::default(),
            traceability: TraceabilityConfig::default(),
            logbook: LogbookConfig::default(),
        };
        cfg.resolve_paths();
        cfg
    }

    /// Read `<root>/fossil.toml`, falling back to defaults when it is absent.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join(CONFIG_FILE);
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| FossilError::io(&path, e))?;
            let mut parsed = Self::from_toml_str(&text).map_err(|message| FossilError::Config {
                path: path.clone(),
                message,
            })?;
            parsed.root = root;
            parsed
        } else {
            tracing::info!(
                "No config file found at {}. Using StoreConfig defaults.",
                path.display()
            );
            return Ok(Self::at(root));
        };
        cfg.resolve_paths();
        cfg.check().map_err(|message| FossilError::Config { path, message })?;
        Ok(cfg)
    }

    fn from_toml_str(text: &str) -> std::result::Result<Self, String> {
        toml::from_str::<StoreConfig>(text).map_err(|e| e.to_string())
    }

    fn resolve_paths(&mut self) {
        self.layout.entries_dir = absolutize(&self.root, &self.layout.entries_dir);
        self.layout.canonical_dir = absolutize(&self.root, &self.layout.canonical_dir);
        self.layout.archive_dir = absolutize(&self.root, &self.layout.archive_dir);
        self.layout.locks_dir = absolutize(&self.root, &self.layout.locks_dir);
        self.logbook.file = absolutize(&self.root, &self.logbook.file);
    }

    fn check(&self) -> std::result::Result<(), String> {
        if !(0.0..=100.0).contains(&self.dedup.threshold) {
            return Err(format!(
                "dedup.threshold must be within 0..=100, got {}",
                self.dedup.threshold
            ));
        }
        if self.dedup.title_weight + self.dedup.content_weight == 0 {
            return Err("dedup weights must not both be zero".to_string());
        }
        if self.query.max_limit == 0 {
            return Err("query.max_limit must be positive".to_string());
        }
        Ok(())
    }

    pub fn entries_dir(&self) -> &Path {
        &self.layout.entries_dir
    }

    pub fn canonical_dir(&self) -> &Path {
        &self.layout.canonical_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.layout.archive_dir
    }

    pub fn locks_dir(&self) -> &Path {
        &self.layout.locks_dir
    }

    /// Highest issued canonical version per category.
    pub fn versions_dir(&self) -> PathBuf {
        self.layout.canonical_dir.join(VERSIONS_DIR)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "LayoutConfig::default_entries_dir")]
    pub entries_dir: PathBuf,
    #[serde(default = "LayoutConfig::default_canonical_dir")]
    pub canonical_dir: PathBuf,
    #[serde(default = "LayoutConfig::default_archive_dir")]
    pub archive_dir: PathBuf,
    #[serde(default = "LayoutConfig::default_locks_dir")]
    pub locks_dir: PathBuf,
}

impl LayoutConfig {
    fn default_entries_dir() -> PathBuf {
        PathBuf::from("entries")
    }

    fn default_canonical_dir() -> PathBuf {
        PathBuf::from("canonical")
    }

    fn default_archive_dir() -> PathBuf {
        PathBuf::from("archive")
    }

    fn default_locks_dir() -> PathBuf {
        PathBuf::from(".locks")
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            entries_dir: Self::default_entries_dir(),
            canonical_dir: Self::default_canonical_dir(),
            archive_dir: Self::default_archive_dir(),
            locks_dir: Self::default_locks_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Similarity score (0..=100) at which a candidate counts as a duplicate.
    #[serde(default = "DedupConfig::default_threshold")]
    pub threshold: f64,
    #[serde(default = "DedupConfig::default_title_weight")]
    pub title_weight: u32,
    #[serde(default = "DedupConfig::default_content_weight")]
    pub content_weight: u32,
}

impl DedupConfig {
    fn default_threshold() -> f64 {
        80.0
    }

    fn default_title_weight() -> u32 {
        3
    }

    fn default_content_weight() -> u32 {
        7
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: Self::default_threshold(),
            title_weight: Self::default_title_weight(),
            content_weight: Self::default_content_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "QueryConfig::default_limit")]
    pub default_limit: usize,
    #[serde(default = "QueryConfig::default_max_limit")]
    pub max_limit: usize,
}

impl QueryConfig {
    fn default_limit() -> usize {
        20
    }

    fn default_max_limit() -> usize {
        500
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: Self::default_limit(),
            max_limit: Self::default_max_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalConfig {
    /// Attribution used for new entries without `createdBy` and for canonical
    /// envelopes when version control cannot name an author.
    #[serde(default = "CanonicalConfig::default_author")]
    pub default_author: String,
    #[serde(default = "CanonicalConfig::default_email")]
    pub default_email: String,
}

impl CanonicalConfig {
    fn default_author() -> String {
        "fossil-store".to_string()
    }

    fn default_email() -> String {
        "unknown".to_string()
    }
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            default_author: Self::default_author(),
            default_email: Self::default_email(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceabilityConfig {
    /// Repository-relative prefix of the fossil root. Defaults to what git
    /// reports for the root, else the root's directory name.
    #[serde(default)]
    pub path_prefix: Option<PathBuf>,
    /// Record traceability after every canonical update made through the facade.
    #[serde(default = "TraceabilityConfig::default_auto_record")]
    pub auto_record: bool,
}

impl TraceabilityConfig {
    fn default_auto_record() -> bool {
        true
    }
}

impl Default for TraceabilityConfig {
    fn default() -> Self {
        Self {
            path_prefix: None,
            auto_record: Self::default_auto_record(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogbookConfig {
    #[serde(default = "LogbookConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "LogbookConfig::default_file")]
    pub file: PathBuf,
}

impl LogbookConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_file() -> PathBuf {
        PathBuf::from("logbook.jsonl")
    }
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            file: Self::default_file(),
        }
    }
}

fn absolutize(root: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        root.join(value)
    }
}
