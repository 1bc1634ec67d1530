//! Ad hoc fossil entries: the typed record, the raw candidate callers submit,
//! and the patch applied by `update`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub type Metadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FossilType {
    Observation,
    Insight,
    Decision,
    Action,
    Knowledge,
}

impl FossilType {
    pub const ALL: [FossilType; 5] = [
        FossilType::Observation,
        FossilType::Insight,
        FossilType::Decision,
        FossilType::Action,
        FossilType::Knowledge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FossilType::Observation => "observation",
            FossilType::Insight => "insight",
            FossilType::Decision => "decision",
            FossilType::Action => "action",
            FossilType::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for FossilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FossilType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown fossil type {s:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FossilSource {
    Terminal,
    AutomatedScript,
    Manual,
    Imported,
}

impl FossilSource {
    pub const ALL: [FossilSource; 4] = [
        FossilSource::Terminal,
        FossilSource::AutomatedScript,
        FossilSource::Manual,
        FossilSource::Imported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FossilSource::Terminal => "terminal",
            FossilSource::AutomatedScript => "automated-script",
            FossilSource::Manual => "manual",
            FossilSource::Imported => "imported",
        }
    }
}

impl Default for FossilSource {
    fn default() -> Self {
        FossilSource::AutomatedScript
    }
}

impl fmt::Display for FossilSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FossilSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown fossil source {s:?}"))
    }
}

/// A prior state kept in `previousVersions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub version: u32,
    /// Empty in files written before titles were snapshotted.
    #[serde(default)]
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// A stored fossil entry, one JSON file per id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FossilEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FossilType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub source: FossilSource,
    #[serde(default)]
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
    #[serde(default)]
    pub previous_versions: Vec<VersionSnapshot>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub content_hash: String,
}

impl FossilEntry {
    /// Content parsed as JSON, for entries that carry structured payloads.
    pub fn content_json(&self) -> Option<Value> {
        serde_json::from_str(&self.content).ok()
    }

    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.tags.contains(t.as_ref()))
    }
}

/// Hex BLAKE3 over `title`, a NUL separator, and `content`.
pub fn content_hash(title: &str, content: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(title.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Unvalidated input to `create`. Enum fields are raw strings so the
/// validator can report out-of-range values instead of a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFossil {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewFossil {
    pub fn new(kind: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_created_by(mut self, who: impl Into<String>) -> Self {
        self.created_by = Some(who.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A candidate that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidEntry {
    pub kind: FossilType,
    pub title: String,
    pub content: String,
    pub tags: BTreeSet<String>,
    pub source: FossilSource,
    pub created_by: String,
    pub metadata: Metadata,
}

/// Partial update. `None` leaves a field untouched; `metadata` merges key by key
/// and a JSON `null` value removes the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FossilPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl FossilPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none() && self.metadata.is_none()
    }
}
