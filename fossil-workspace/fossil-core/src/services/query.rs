// src/services/query.rs
//! Read-only filtering and pagination over the repository corpus.
//!
//! Filters AND together; `tags` matches any of the requested tags. Results
//! are ordered by `createdAt` (newest first unless asked otherwise) with `id`
//! as the tiebreak, then `offset`/`limit` are applied. Nothing here writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::QueryConfig;
use crate::error::Result;
use crate::fossil::{FossilEntry, FossilType};
use crate::services::repository::FossilRepository;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Inclusive `createdAt` bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    #[serde(default, rename = "type")]
    pub kind: Option<FossilType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// `0` means the configured default.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub order: SortOrder,
}

impl QueryFilter {
    pub fn of_type(kind: FossilType) -> Self {
        Self {
            kind: Some(kind),
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

    pub fn with_search(mut self, needle: impl Into<String>) -> Self {
        self.search = Some(needle.into());
        self
    }

    pub fn created_between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.date_range = Some(DateRange { from, to });
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = SortOrder::OldestFirst;
        self
    }

    fn matches(&self, entry: &FossilEntry, needle: Option<&str>) -> bool {
        if self.kind.is_some_and(|k| k != entry.kind) {
            return false;
        }
        if !self.tags.is_empty() && !entry.has_any_tag(&self.tags) {
            return false;
        }
        if let Some(range) = &self.date_range {
            if !range.contains(entry.created_at) {
                return false;
            }
        }
        match needle {
            Some(n) => {
                entry.title.to_lowercase().contains(n) || entry.content.to_lowercase().contains(n)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    pub entries: Vec<FossilEntry>,
    /// Matches before pagination.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_tag: BTreeMap<String, usize>,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct QueryEngine<'a> {
    repo: &'a FossilRepository,
    limits: QueryConfig,
}

impl<'a> QueryEngine<'a> {
    pub fn new(repo: &'a FossilRepository, limits: QueryConfig) -> Self {
        Self { repo, limits }
    }

    pub fn query(&self, filter: &QueryFilter) -> Result<QueryPage> {
        let corpus = self.repo.scan()?;
        Ok(run_query(corpus, filter, &self.limits))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(collect_stats(&self.repo.scan()?))
    }
}

/// Filter, order and paginate an already loaded corpus.
pub fn run_query(corpus: Vec<FossilEntry>, filter: &QueryFilter, limits: &QueryConfig) -> QueryPage {
    let limit = effective_limit(filter.limit, limits);
    let needle = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut hits: Vec<FossilEntry> = corpus
        .into_iter()
        .filter(|e| filter.matches(e, needle.as_deref()))
        .collect();
    hits.sort_by(|a, b| {
        let by_time = match filter.order {
            SortOrder::NewestFirst => b.created_at.cmp(&a.created_at),
            SortOrder::OldestFirst => a.created_at.cmp(&b.created_at),
        };
        by_time.then_with(|| a.id.cmp(&b.id))
    });

    let total = hits.len();
    let entries: Vec<FossilEntry> = hits.into_iter().skip(filter.offset).take(limit).collect();
    let has_more = filter.offset.saturating_add(entries.len()) < total;
    tracing::debug!(total, returned = entries.len(), offset = filter.offset, limit, "query evaluated");
    QueryPage {
        entries,
        total,
        limit,
        offset: filter.offset,
        has_more,
    }
}

pub fn collect_stats(corpus: &[FossilEntry]) -> StoreStats {
    let mut stats = StoreStats {
        total: corpus.len(),
        ..Default::default()
    };
    for entry in corpus {
        *stats.by_type.entry(entry.kind.to_string()).or_default() += 1;
        for tag in &entry.tags {
            *stats.by_tag.entry(tag.clone()).or_default() += 1;
        }
        stats.last_updated = stats.last_updated.max(Some(entry.updated_at));
    }
    stats
}

fn effective_limit(requested: usize, limits: &QueryConfig) -> usize {
    let limit = if requested == 0 {
        limits.default_limit
    } else {
        requested
    };
    limit.min(limits.max_limit)
}
