use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::providers::ConceptIndex;
use error_common::log_soft_failure;

/// One standard concept matched for a queried keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMatch {
    pub concept_id: String,
    pub term_label: String,
    pub semantic_tag: Option<String>,
    /// Relevance score from the full-text index, in `[0, 1]`.
    pub score: f64,
}

/// Matches for one normalized keyword, in index-native descending-score
/// order (capped at the configured top-K).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermMatches {
    pub term: String,
    pub matches: Vec<ConceptMatch>,
}

/// Resolved terminology for one query batch.
///
/// Entries keep the caller's term order, keys are normalized and unique, and
/// an entry with an empty match list marks a term the index had nothing for
/// (or a per-term lookup failure).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminologyResult {
    entries: Vec<TermMatches>,
}

impl TerminologyResult {
    pub fn push(&mut self, term: String, matches: Vec<ConceptMatch>) {
        self.entries.push(TermMatches { term, matches });
    }

    /// Matches for a normalized term, if it was part of the batch.
    pub fn get(&self, term: &str) -> Option<&[ConceptMatch]> {
        self.entries
            .iter()
            .find(|entry| entry.term == term)
            .map(|entry| entry.matches.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermMatches> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if no queried term matched anything.
    pub fn has_no_matches(&self) -> bool {
        self.entries.iter().all(|entry| entry.matches.is_empty())
    }
}

/// Tunables for concept resolution. The relevance threshold and cutoff were
/// inconsistent across the original call sites, so both are configuration
/// rather than literals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum relevance score a match must reach to be kept.
    pub min_score: f64,
    /// Matches retained per term.
    pub top_k: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            top_k: 5,
        }
    }
}

/// Normalization applied to every keyword before lookup.
pub fn normalize_term(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Resolves free-text medical terms to scored SNOMED CT concepts.
///
/// `resolve` never fails: a lookup failure yields an empty match list for
/// that term only. Index-native ordering is trusted; matches are filtered by
/// `min_score` and truncated to `top_k` without re-sorting, so ties keep the
/// service's stable order.
pub struct TerminologyResolver {
    index: Arc<dyn ConceptIndex>,
    config: ResolverConfig,
}

impl TerminologyResolver {
    pub fn new(index: Arc<dyn ConceptIndex>, config: ResolverConfig) -> Self {
        Self { index, config }
    }

    pub async fn resolve(&self, terms: &[String]) -> TerminologyResult {
        let mut result = TerminologyResult::default();
        let mut seen: HashSet<String> = HashSet::new();

        for raw in terms {
            let term = normalize_term(raw);
            if term.is_empty() || !seen.insert(term.clone()) {
                continue;
            }

            let matches = match self.index.search(&term).await {
                Ok(rows) => {
                    let kept: Vec<ConceptMatch> = rows
                        .into_iter()
                        .filter(|m| m.score >= self.config.min_score)
                        .take(self.config.top_k)
                        .collect();
                    debug!(term = %term, matches = kept.len(), "term resolved");
                    kept
                }
                Err(err) => {
                    log_soft_failure("terminology", &err);
                    Vec::new()
                }
            };

            result.push(term, matches);
        }

        result
    }
}
