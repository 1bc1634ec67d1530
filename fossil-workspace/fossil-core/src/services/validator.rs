// src/services/validator.rs
//! Entry validator: the gate every candidate passes before touching storage.
//!
//! Collects every violation instead of stopping at the first, and fails
//! closed: callers only ever see a fully valid [`ValidEntry`] or the list of
//! issues.

use std::collections::BTreeSet;

use crate::error::{FossilError, Result, ValidationIssue};
use crate::fossil::{FossilEntry, FossilSource, FossilType, NewFossil, ValidEntry};

#[derive(Debug, Clone)]
pub struct Validator {
    default_author: String,
}

impl Validator {
    pub fn new(default_author: impl Into<String>) -> Self {
        Self {
            default_author: default_author.into(),
        }
    }

    pub fn validate(&self, candidate: &NewFossil) -> Result<ValidEntry> {
        let mut issues = Vec::new();

        let kind = if candidate.kind.trim().is_empty() {
            issues.push(ValidationIssue::new("type", "is required"));
            None
        } else {
            match candidate.kind.parse::<FossilType>() {
                Ok(kind) => Some(kind),
                Err(_) => {
                    issues.push(ValidationIssue::new(
                        "type",
                        format!(
                            "{:?} is not one of {}",
                            candidate.kind,
                            FossilType::ALL.map(|t| t.as_str()).join(", ")
                        ),
                    ));
                    None
                }
            }
        };

        let source = match candidate.source.as_deref() {
            None => Some(FossilSource::default()),
            Some(raw) => match raw.parse::<FossilSource>() {
                Ok(source) => Some(source),
                Err(_) => {
                    issues.push(ValidationIssue::new(
                        "source",
                        format!(
                            "{raw:?} is not one of {}",
                            FossilSource::ALL.map(|s| s.as_str()).join(", ")
                        ),
                    ));
                    None
                }
            },
        };

        check_text("title", &candidate.title, &mut issues);
        check_text("content", &candidate.content, &mut issues);
        let tags = check_tags(&candidate.tags, &mut issues);

        let created_by = match candidate.created_by.as_deref().map(str::trim) {
            Some(who) if !who.is_empty() => who.to_string(),
            _ => self.default_author.clone(),
        };

        match (kind, source) {
            (Some(kind), Some(source)) if issues.is_empty() => Ok(ValidEntry {
                kind,
                title: candidate.title.trim().to_string(),
                content: candidate.content.clone(),
                tags,
                source,
                created_by,
                metadata: candidate.metadata.clone(),
            }),
            _ => Err(FossilError::Validation(issues)),
        }
    }

    /// Re-check a stored entry after a patch was applied to it.
    pub fn validate_entry(&self, entry: &FossilEntry) -> Result<()> {
        let mut issues = Vec::new();
        check_text("title", &entry.title, &mut issues);
        check_text("content", &entry.content, &mut issues);
        for tag in &entry.tags {
            if tag.trim().is_empty() {
                issues.push(ValidationIssue::new("tags", "must not contain empty tags"));
                break;
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(FossilError::Validation(issues))
        }
    }
}

/// Threshold must lie in `0..=100`.
pub fn check_threshold(threshold: f64) -> Result<f64> {
    if threshold.is_finite() && (0.0..=100.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(FossilError::validation(
            "dedupThreshold",
            format!("must be within 0..=100, got {threshold}"),
        ))
    }
}

/// Trim and dedup tags; empty tags are violations.
pub fn normalize_tags(raw: &[String]) -> Result<BTreeSet<String>> {
    let mut issues = Vec::new();
    let tags = check_tags(raw, &mut issues);
    if issues.is_empty() {
        Ok(tags)
    } else {
        Err(FossilError::Validation(issues))
    }
}

fn check_text(field: &str, value: &str, issues: &mut Vec<ValidationIssue>) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::new(field, "must not be empty"));
    }
}

fn check_tags(raw: &[String], issues: &mut Vec<ValidationIssue>) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for (idx, tag) in raw.iter().enumerate() {
        let t = tag.trim();
        if t.is_empty() {
            issues.push(ValidationIssue::new(
                format!("tags[{idx}]"),
                "must be a non-empty string",
            ));
        } else {
            out.insert(t.to_string());
        }
    }
    out
}
