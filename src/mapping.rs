//! Weighted bipartite link sets between source and target entities.
//!
//! A [`Mapping`] stores at most one confidence per (source, target) pair.
//! Iteration is ordered by URI so that seeded fold generation and tuning
//! splits are reproducible across runs and platforms.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::MappingError;

/// Scores at or above this value count as positive links.
pub const POSITIVE_THRESHOLD: f64 = 0.5;

/// A mapping from source URI to (target URI → confidence).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    links: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from `(source, target, score)` triples.
    pub fn from_links<S, T>(links: impl IntoIterator<Item = (S, T, f64)>) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        let mut mapping = Self::new();
        for (s, t, score) in links {
            mapping.add(s, t, score);
        }
        mapping
    }

    /// Insert or overwrite the confidence of a link.
    pub fn add(&mut self, source: impl Into<String>, target: impl Into<String>, score: f64) {
        self.links
            .entry(source.into())
            .or_default()
            .insert(target.into(), score);
    }

    /// Insert a link after checking that its confidence lies in `[0, 1]`.
    pub fn try_add(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        score: f64,
    ) -> Result<(), MappingError> {
        let (source, target) = (source.into(), target.into());
        if !(0.0..=1.0).contains(&score) {
            return Err(MappingError::InvalidScore {
                source_uri: source,
                target_uri: target,
                score,
            });
        }
        self.add(source, target, score);
        Ok(())
    }

    /// Insert every target of one source at once.
    pub fn add_all(&mut self, source: impl Into<String>, targets: &BTreeMap<String, f64>) {
        let entry = self.links.entry(source.into()).or_default();
        for (t, score) in targets {
            entry.insert(t.clone(), *score);
        }
    }

    /// Remove a single link. Empty source rows are dropped.
    pub fn remove(&mut self, source: &str, target: &str) -> Option<f64> {
        let row = self.links.get_mut(source)?;
        let removed = row.remove(target);
        if row.is_empty() {
            self.links.remove(source);
        }
        removed
    }

    /// Remove a source and all its links.
    pub fn remove_source(&mut self, source: &str) -> Option<BTreeMap<String, f64>> {
        self.links.remove(source)
    }

    pub fn contains(&self, source: &str, target: &str) -> bool {
        self.links
            .get(source)
            .is_some_and(|row| row.contains_key(target))
    }

    pub fn contains_source(&self, source: &str) -> bool {
        self.links.contains_key(source)
    }

    pub fn score(&self, source: &str, target: &str) -> Option<f64> {
        self.links.get(source)?.get(target).copied()
    }

    /// Targets (with confidences) linked to `source`.
    pub fn targets(&self, source: &str) -> Option<&BTreeMap<String, f64>> {
        self.links.get(source)
    }

    /// Number of links.
    pub fn size(&self) -> usize {
        self.links.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of distinct sources with at least one link.
    pub fn source_count(&self) -> usize {
        self.links.len()
    }

    /// Source URIs in iteration order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }

    /// Source rows in iteration order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, f64>)> {
        self.links.iter().map(|(s, row)| (s.as_str(), row))
    }

    /// Every link as `(source, target, score)` in iteration order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.links.iter().flat_map(|(s, row)| {
            row.iter()
                .map(move |(t, score)| (s.as_str(), t.as_str(), *score))
        })
    }

    /// Distinct target URIs referenced by any link.
    pub fn target_uris(&self) -> BTreeSet<&str> {
        self.links
            .values()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }

    /// Links whose confidence marks them as positive examples.
    pub fn positive(&self) -> Mapping {
        let mut result = Mapping::new();
        for (s, t, score) in self.pairs() {
            if score >= POSITIVE_THRESHOLD {
                result.add(s, t, score);
            }
        }
        result
    }

    pub fn positive_count(&self) -> usize {
        self.pairs()
            .filter(|(_, _, score)| *score >= POSITIVE_THRESHOLD)
            .count()
    }

    /// Score-wise merge. Links present in both keep `other`'s confidence.
    pub fn union(&self, other: &Mapping) -> Mapping {
        let mut result = self.clone();
        for (s, row) in &other.links {
            result.add_all(s.clone(), row);
        }
        result
    }

    /// Links of `self` that do not appear in `other`.
    pub fn difference(&self, other: &Mapping) -> Mapping {
        let mut result = Mapping::new();
        for (s, t, score) in self.pairs() {
            if !other.contains(s, t) {
                result.add(s, t, score);
            }
        }
        result
    }

    /// Links present in both mappings, keeping `self`'s confidence.
    pub fn intersection(&self, other: &Mapping) -> Mapping {
        let mut result = Mapping::new();
        for (s, t, score) in self.pairs() {
            if other.contains(s, t) {
                result.add(s, t, score);
            }
        }
        result
    }

    /// True when every link of `other` is also a link of `self`.
    pub fn contains_all(&self, other: &Mapping) -> bool {
        other.pairs().all(|(s, t, _)| self.contains(s, t))
    }

    /// Keep only links whose endpoints lie in the given universes.
    pub fn restrict_to(&self, sources: &BTreeSet<String>, targets: &BTreeSet<String>) -> Mapping {
        let mut result = Mapping::new();
        for (s, t, score) in self.pairs() {
            if sources.contains(s) && targets.contains(t) {
                result.add(s, t, score);
            }
        }
        result
    }
}

/// A reference mapping together with the universe of URIs it is defined over.
///
/// Predicted links outside the universe are ignored when scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoldStandard {
    pub reference: Mapping,
    pub source_uris: BTreeSet<String>,
    pub target_uris: BTreeSet<String>,
}

impl GoldStandard {
    pub fn new(
        reference: Mapping,
        source_uris: BTreeSet<String>,
        target_uris: BTreeSet<String>,
    ) -> Self {
        Self {
            reference,
            source_uris,
            target_uris,
        }
    }

    /// A gold standard whose universe is exactly the URIs it references.
    pub fn from_mapping(reference: Mapping) -> Self {
        let source_uris = reference.sources().map(str::to_string).collect();
        let target_uris = reference
            .target_uris()
            .into_iter()
            .map(str::to_string)
            .collect();
        Self::new(reference, source_uris, target_uris)
    }

    /// Number of positively-labeled reference links.
    pub fn positive_count(&self) -> usize {
        self.reference.positive_count()
    }

    pub fn is_positive(&self, source: &str, target: &str) -> bool {
        self.reference
            .score(source, target)
            .is_some_and(|score| score >= POSITIVE_THRESHOLD)
    }

    /// Drop predicted links outside this gold standard's universe.
    pub fn filter_predictions(&self, predictions: &Mapping) -> Mapping {
        predictions.restrict_to(&self.source_uris, &self.target_uris)
    }
}
