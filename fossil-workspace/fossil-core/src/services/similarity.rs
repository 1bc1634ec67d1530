// src/services/similarity.rs
//! Similarity engine: token-set overlap between a candidate and the corpus.
//!
//! Title and content are tokenized into lowercase, whitespace-delimited word
//! sets. Each pair of sets scores `|a ∩ b| / max(|a|, |b|) * 100`; the two
//! scores are combined as a weighted average (content weighted higher by
//! default). The scan is linear over the corpus.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::DedupConfig;
use crate::fossil::FossilEntry;

/// One ranked hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarMatch {
    pub entry: FossilEntry,
    pub score: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityEngine {
    title_weight: u32,
    content_weight: u32,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}

impl SimilarityEngine {
    pub fn from_config(cfg: &DedupConfig) -> Self {
        Self::with_weights(cfg.title_weight, cfg.content_weight)
    }

    /// Both weights zero falls back to an unweighted mean.
    pub fn with_weights(title_weight: u32, content_weight: u32) -> Self {
        if title_weight == 0 && content_weight == 0 {
            return Self {
                title_weight: 1,
                content_weight: 1,
            };
        }
        Self {
            title_weight,
            content_weight,
        }
    }

    /// Score a candidate `(title, content)` against one entry.
    pub fn score(&self, title: &str, content: &str, entry: &FossilEntry) -> f64 {
        let needle = Needle::new(title, content);
        self.score_needle(&needle, entry)
    }

    /// Rank every corpus entry scoring at least `threshold`.
    ///
    /// Highest score first; ties go to the most recently created entry, then
    /// to the lexicographically smaller id.
    pub fn find_similar(
        &self,
        corpus: &[FossilEntry],
        title: &str,
        content: &str,
        threshold: f64,
    ) -> Vec<SimilarMatch> {
        let needle = Needle::new(title, content);
        let mut hits: Vec<SimilarMatch> = corpus
            .iter()
            .filter_map(|entry| {
                let score = self.score_needle(&needle, entry);
                (score >= threshold).then(|| SimilarMatch {
                    entry: entry.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(rank);
        hits
    }

    /// Best match at or above `threshold`, if any.
    pub fn best_match(
        &self,
        corpus: &[FossilEntry],
        title: &str,
        content: &str,
        threshold: f64,
    ) -> Option<SimilarMatch> {
        self.find_similar(corpus, title, content, threshold)
            .into_iter()
            .next()
    }

    fn score_needle(&self, needle: &Needle, entry: &FossilEntry) -> f64 {
        let title = overlap(&needle.title, &tokenize(&entry.title));
        let content = overlap(&needle.content, &tokenize(&entry.content));
        let tw = f64::from(self.title_weight);
        let cw = f64::from(self.content_weight);
        ((tw * title + cw * content) / (tw + cw)).clamp(0.0, 100.0)
    }
}

struct Needle {
    title: HashSet<String>,
    content: HashSet<String>,
}

impl Needle {
    fn new(title: &str, content: &str) -> Self {
        Self {
            title: tokenize(title),
            content: tokenize(content),
        }
    }
}

/// Lowercase whitespace-delimited word set.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// `|a ∩ b| / max(|a|, |b|) * 100`. Two empty sets are identical (100).
pub fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let max = a.len().max(b.len());
    if max == 0 {
        return 100.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let shared = small.iter().filter(|t| large.contains(*t)).count();
    if shared == max {
        return 100.0;
    }
    shared as f64 * 100.0 / max as f64
}

fn rank(a: &SimilarMatch, b: &SimilarMatch) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.entry.created_at.cmp(&a.entry.created_at))
        .then_with(|| a.entry.id.cmp(&b.entry.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fossil::{content_hash, FossilSource, FossilType, Metadata};
    use chrono::{Duration, TimeZone, Utc};

    fn entry(id: &str, title: &str, content: &str, age_secs: i64) -> FossilEntry {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap() - Duration::seconds(age_secs);
        FossilEntry {
            id: id.into(),
            kind: FossilType::Insight,
            title: title.into(),
            content: content.into(),
            tags: Default::default(),
            source: FossilSource::Manual,
            created_by: "t".into(),
            created_at: at,
            updated_at: at,
            version: 1,
            previous_versions: vec![],
            metadata: Metadata::new(),
            content_hash: content_hash(title, content),
        }
    }

    #[test]
    fn identical_token_sets_score_100() {
        let e = entry("a", "Open Issues", "12 open issues in repo X", 0);
        let engine = SimilarityEngine::default();
        assert_eq!(engine.score("open   issues", "repo x in 12 ISSUES open", &e), 100.0);
    }

    #[test]
    fn overlap_uses_larger_set_as_denominator() {
        let a = tokenize("one two three four");
        let b = tokenize("one two");
        assert_eq!(overlap(&a, &b), 50.0);
        assert_eq!(overlap(&b, &a), 50.0);
        assert_eq!(overlap(&tokenize(""), &tokenize("")), 100.0);
        assert_eq!(overlap(&tokenize(""), &tokenize("x")), 0.0);
    }

    #[test]
    fn weights_favor_content() {
        let e = entry("a", "alpha", "same body text", 0);
        let engine = SimilarityEngine::default();
        // title 0, content 100 -> 70 with 3:7 weights
        assert_eq!(engine.score("beta", "same body text", &e), 70.0);
        // title 100, content 0 -> 30
        assert_eq!(engine.score("alpha", "different words", &e), 30.0);
    }

    #[test]
    fn empty_corpus_yields_nothing() {
        let engine = SimilarityEngine::default();
        assert!(engine.find_similar(&[], "t", "c", 0.0).is_empty());
    }

    #[test]
    fn threshold_zero_returns_everything_ranked() {
        let corpus = vec![
            entry("a", "x", "nothing shared", 30),
            entry("b", "release notes", "version two shipped", 20),
            entry("c", "release notes", "version two shipped today", 10),
        ];
        let engine = SimilarityEngine::default();
        let hits = engine.find_similar(&corpus, "release notes", "version two shipped", 0.0);
        let ids: Vec<&str> = hits.iter().map(|h| h.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn ties_prefer_newest() {
        let corpus = vec![
            entry("old", "same", "same words", 100),
            entry("new", "same", "same words", 1),
        ];
        let hits = SimilarityEngine::default().find_similar(&corpus, "same", "same words", 100.0);
        assert_eq!(hits[0].entry.id, "new");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn threshold_100_requires_exact_sets() {
        let corpus = vec![entry("a", "t", "a b c d e f g h i j", 0)];
        let engine = SimilarityEngine::default();
        assert!(engine.find_similar(&corpus, "t", "a b c d e f g h i", 100.0).is_empty());
        assert_eq!(engine.find_similar(&corpus, "t", "j i h g f e d c b a", 100.0).len(), 1);
    }
}
