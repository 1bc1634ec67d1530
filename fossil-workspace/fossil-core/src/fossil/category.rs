use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed set of canonical snapshot categories. Each has exactly one live file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalCategory {
    Validation,
    Performance,
    Analysis,
    Test,
    Footprint,
    Traceability,
    /// Aggregate cross-category view, written as YAML.
    Context,
}

impl CanonicalCategory {
    pub const ALL: [CanonicalCategory; 7] = [
        CanonicalCategory::Validation,
        CanonicalCategory::Performance,
        CanonicalCategory::Analysis,
        CanonicalCategory::Test,
        CanonicalCategory::Footprint,
        CanonicalCategory::Traceability,
        CanonicalCategory::Context,
    ];

    /// Categories aggregated into the context snapshot.
    pub const SNAPSHOT_SOURCES: [CanonicalCategory; 6] = [
        CanonicalCategory::Validation,
        CanonicalCategory::Performance,
        CanonicalCategory::Analysis,
        CanonicalCategory::Test,
        CanonicalCategory::Footprint,
        CanonicalCategory::Traceability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalCategory::Validation => "validation",
            CanonicalCategory::Performance => "performance",
            CanonicalCategory::Analysis => "analysis",
            CanonicalCategory::Test => "test",
            CanonicalCategory::Footprint => "footprint",
            CanonicalCategory::Traceability => "traceability",
            CanonicalCategory::Context => "context",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            CanonicalCategory::Context => "yml",
            _ => "json",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.as_str(), self.extension())
    }
}

impl fmt::Display for CanonicalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown canonical category {s:?}"))
    }
}
