//! Paired significance testing between algorithms.
//!
//! For each pair of algorithms the comparator counts test instances on which
//! exactly one of them agrees with the gold standard, accumulated over all
//! folds of a dataset, and feeds the discordant counts to McNemar's test.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, ChiSquared, ContinuousCDF, DiscreteCDF};

use crate::error::StatsError;
use crate::mapping::{GoldStandard, Mapping};

/// Below this discordant count the exact binomial variant is used.
pub const EXACT_TEST_THRESHOLD: u64 = 5;

/// Discordant-pair counts for an ordered algorithm pair (A, B).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessFailureCount {
    /// Instances where A agrees with gold and B does not.
    pub successes: u64,
    /// Instances where B agrees with gold and A does not.
    pub failures: u64,
}

impl SuccessFailureCount {
    pub fn new(successes: u64, failures: u64) -> Self {
        Self {
            successes,
            failures,
        }
    }

    /// The same counts seen from (B, A).
    pub fn swapped(self) -> Self {
        Self::new(self.failures, self.successes)
    }

    pub fn add(&mut self, other: SuccessFailureCount) {
        self.successes += other.successes;
        self.failures += other.failures;
    }

    pub fn discordant(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn mcnemar(&self) -> Result<McNemarOutcome, StatsError> {
        mcnemar(self.successes, self.failures)
    }
}

/// Which variant of McNemar's test produced a p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMethod {
    /// No discordant pairs; the algorithms are indistinguishable.
    NoDiscordance,
    ExactBinomial,
    ChiSquare,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct McNemarOutcome {
    pub p_value: f64,
    /// Continuity-corrected chi-square statistic (0 for the exact variant).
    pub statistic: f64,
    pub method: TestMethod,
}

/// McNemar's test on discordant counts `b` and `c`.
///
/// Uses the two-sided exact binomial test when either count is below
/// [`EXACT_TEST_THRESHOLD`], otherwise the continuity-corrected chi-square
/// approximation with one degree of freedom. Symmetric in `b` and `c`.
pub fn mcnemar(b: u64, c: u64) -> Result<McNemarOutcome, StatsError> {
    let n = b + c;
    if n == 0 {
        return Ok(McNemarOutcome {
            p_value: 1.0,
            statistic: 0.0,
            method: TestMethod::NoDiscordance,
        });
    }

    if b < EXACT_TEST_THRESHOLD || c < EXACT_TEST_THRESHOLD {
        let binomial = Binomial::new(0.5, n).map_err(|e| StatsError::Distribution {
            distribution: "binomial",
            message: e.to_string(),
        })?;
        let tail = binomial.cdf(b.min(c));
        return Ok(McNemarOutcome {
            p_value: (2.0 * tail).min(1.0),
            statistic: 0.0,
            method: TestMethod::ExactBinomial,
        });
    }

    let diff = (b as f64 - c as f64).abs() - 1.0;
    let statistic = diff * diff / n as f64;
    let chi2 = ChiSquared::new(1.0).map_err(|e| StatsError::Distribution {
        distribution: "chi-square",
        message: e.to_string(),
    })?;
    Ok(McNemarOutcome {
        p_value: (1.0 - chi2.cdf(statistic)).clamp(0.0, 1.0),
        statistic,
        method: TestMethod::ChiSquare,
    })
}

/// Count instances where `a` agrees with the gold standard and `b` does not.
///
/// An instance is any link predicted by either algorithm or positive in the
/// gold standard; an algorithm agrees with gold on it when it predicts the
/// link exactly when gold marks it positive.
pub fn successes(a: &Mapping, b: &Mapping, gold: &GoldStandard) -> u64 {
    let mut instances: BTreeSet<(&str, &str)> = BTreeSet::new();
    instances.extend(a.pairs().map(|(s, t, _)| (s, t)));
    instances.extend(b.pairs().map(|(s, t, _)| (s, t)));
    instances.extend(
        gold.reference
            .pairs()
            .filter(|(s, t, _)| gold.is_positive(s, t))
            .map(|(s, t, _)| (s, t)),
    );

    instances
        .into_iter()
        .filter(|(s, t)| {
            let positive = gold.is_positive(s, t);
            a.contains(s, t) == positive && b.contains(s, t) != positive
        })
        .count() as u64
}

/// Discordant counts of one fold for the ordered pair (a, b).
pub fn count_fold(a: &Mapping, b: &Mapping, gold: &GoldStandard) -> SuccessFailureCount {
    SuccessFailureCount::new(successes(a, b, gold), successes(b, a, gold))
}

/// Key of one comparison: dataset plus an algorithm pair in name order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComparisonKey {
    pub dataset: String,
    pub algorithm_a: String,
    pub algorithm_b: String,
}

impl ComparisonKey {
    /// Build a key with the pair ordered by name, and whether it was swapped.
    pub fn ordered(dataset: &str, a: &str, b: &str) -> (Self, bool) {
        let swapped = a > b;
        let (first, second) = if swapped { (b, a) } else { (a, b) };
        (
            Self {
                dataset: dataset.to_string(),
                algorithm_a: first.to_string(),
                algorithm_b: second.to_string(),
            },
            swapped,
        )
    }
}

/// Accumulates discordant counts for every algorithm pair of one dataset.
///
/// Each unordered pair is stored once, under its name-ordered key, so a fold
/// never counts (A, B) and (B, A) separately.
#[derive(Debug, Clone, Default)]
pub struct StatisticalComparator {
    dataset: String,
    counts: BTreeMap<(String, String), SuccessFailureCount>,
}

impl StatisticalComparator {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            counts: BTreeMap::new(),
        }
    }

    /// Add one fold's predictions, keyed by algorithm name.
    pub fn add_fold(&mut self, predictions: &BTreeMap<String, Mapping>, gold: &GoldStandard) {
        let names: Vec<&String> = predictions.keys().collect();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                let count = count_fold(&predictions[*a], &predictions[*b], gold);
                self.counts
                    .entry(((*a).clone(), (*b).clone()))
                    .or_default()
                    .add(count);
            }
        }
    }

    /// Counts for (a, b), oriented as asked.
    pub fn count(&self, a: &str, b: &str) -> Option<SuccessFailureCount> {
        let (key, swapped) = ComparisonKey::ordered(&self.dataset, a, b);
        let count = self.counts.get(&(key.algorithm_a, key.algorithm_b)).copied()?;
        Some(if swapped { count.swapped() } else { count })
    }

    /// Run McNemar's test for every accumulated pair.
    pub fn finish(self) -> Result<Vec<SignificanceResult>, StatsError> {
        let dataset = self.dataset;
        self.counts
            .into_iter()
            .map(|((a, b), count)| {
                let outcome = count.mcnemar()?;
                Ok(SignificanceResult {
                    key: ComparisonKey {
                        dataset: dataset.clone(),
                        algorithm_a: a,
                        algorithm_b: b,
                    },
                    counts: count,
                    outcome,
                })
            })
            .collect()
    }
}

/// McNemar's outcome for one (dataset, A, B) comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    #[serde(flatten)]
    pub key: ComparisonKey,
    pub counts: SuccessFailureCount,
    #[serde(flatten)]
    pub outcome: McNemarOutcome,
}

/// All comparisons of an evaluation, keyed by (dataset, A, B).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignificanceTable {
    entries: BTreeMap<ComparisonKey, SignificanceResult>,
}

impl SignificanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: SignificanceResult) {
        self.entries.insert(result.key.clone(), result);
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = SignificanceResult>) {
        for result in results {
            self.insert(result);
        }
    }

    /// p-value of a comparison; the algorithm order does not matter.
    pub fn p_value(&self, dataset: &str, a: &str, b: &str) -> Option<f64> {
        let (key, _) = ComparisonKey::ordered(dataset, a, b);
        self.entries.get(&key).map(|r| r.outcome.p_value)
    }

    pub fn get(&self, dataset: &str, a: &str, b: &str) -> Option<&SignificanceResult> {
        let (key, _) = ComparisonKey::ordered(dataset, a, b);
        self.entries.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignificanceResult> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for SignificanceTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

impl<'de> Deserialize<'de> for SignificanceTable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let results = Vec::<SignificanceResult>::deserialize(deserializer)?;
        let mut table = SignificanceTable::new();
        table.extend(results);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold() -> GoldStandard {
        GoldStandard::from_mapping(Mapping::from_links([("s1", "t1", 1.0), ("s2", "t2", 1.0)]))
    }

    #[test]
    fn single_fold_counts() {
        let a = Mapping::from_links([("s1", "t1", 1.0)]);
        let b = Mapping::from_links([("s1", "t1", 1.0), ("s2", "t2", 1.0)]);
        let count = count_fold(&a, &b, &gold());
        assert_eq!(count, SuccessFailureCount::new(0, 1));
    }

    #[test]
    fn false_positives_count_as_disagreement() {
        let a = Mapping::from_links([("s1", "t1", 1.0), ("s1", "t2", 1.0)]);
        let b = Mapping::from_links([("s1", "t1", 1.0)]);
        let count = count_fold(&a, &b, &gold());
        // B correctly leaves s1-t2 out; both miss s2-t2.
        assert_eq!(count, SuccessFailureCount::new(0, 1));
    }

    #[test]
    fn swapping_labels_keeps_p_value() {
        for (b, c) in [(0, 1), (3, 12), (20, 7), (40, 41), (5, 5)] {
            let forward = SuccessFailureCount::new(b, c).mcnemar().unwrap();
            let backward = SuccessFailureCount::new(b, c).swapped().mcnemar().unwrap();
            assert!((forward.p_value - backward.p_value).abs() < 1e-12);
            assert_eq!(forward.method, backward.method);
        }
    }

    #[test]
    fn no_discordance_is_not_significant() {
        let outcome = mcnemar(0, 0).unwrap();
        assert_eq!(outcome.p_value, 1.0);
        assert_eq!(outcome.method, TestMethod::NoDiscordance);
    }

    #[test]
    fn small_counts_use_exact_binomial() {
        // P(X <= 0) for Bin(1, 0.5) = 0.5, two-sided = 1.0
        let outcome = mcnemar(0, 1).unwrap();
        assert_eq!(outcome.method, TestMethod::ExactBinomial);
        assert!((outcome.p_value - 1.0).abs() < 1e-12);

        // Bin(10, 0.5): P(X <= 1) = 11/1024, two-sided = 22/1024
        let outcome = mcnemar(1, 9).unwrap();
        assert!((outcome.p_value - 22.0 / 1024.0).abs() < 1e-9);
    }

    #[test]
    fn large_counts_use_chi_square() {
        // (|20 - 5| - 1)^2 / 25 = 7.84, p ≈ 0.00511
        let outcome = mcnemar(20, 5).unwrap();
        assert_eq!(outcome.method, TestMethod::ChiSquare);
        assert!((outcome.statistic - 7.84).abs() < 1e-9);
        assert!((outcome.p_value - 0.00511).abs() < 1e-4);

        let balanced = mcnemar(30, 30).unwrap();
        assert!(balanced.p_value > 0.8);
    }

    #[test]
    fn comparator_accumulates_each_pair_once_per_fold() {
        let gold = gold();
        let mut predictions = BTreeMap::new();
        predictions.insert("A".to_string(), Mapping::from_links([("s1", "t1", 1.0)]));
        predictions.insert(
            "B".to_string(),
            Mapping::from_links([("s1", "t1", 1.0), ("s2", "t2", 1.0)]),
        );

        let mut comparator = StatisticalComparator::new("toy");
        comparator.add_fold(&predictions, &gold);
        comparator.add_fold(&predictions, &gold);

        assert_eq!(comparator.count("A", "B"), Some(SuccessFailureCount::new(0, 2)));
        assert_eq!(comparator.count("B", "A"), Some(SuccessFailureCount::new(2, 0)));

        let results = comparator.finish().unwrap();
        assert_eq!(results.len(), 1);

        let mut table = SignificanceTable::new();
        table.extend(results);
        assert_eq!(table.p_value("toy", "A", "B"), table.p_value("toy", "B", "A"));
        assert!(table.p_value("other", "A", "B").is_none());
    }
}
