//! K-fold partitioning of reference mappings.
//!
//! [`FoldGenerator`] splits a reference mapping into `k` disjoint folds, each
//! carrying minimal copies of the source and target instances it references.
//! Training folds are assembled from the remaining folds by
//! [`assemble::FoldAssembler`].
//!
//! Folds are drawn per source entity: every target of a selected source moves
//! into the fold together, so no link can land in two folds.

pub mod assemble;

use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cache::{Cache, MemoryCache};
use crate::error::FoldError;
use crate::mapping::{GoldStandard, Mapping};

/// Default cap on rejection-sampling draws for one negative example.
pub const DEFAULT_MAX_NEGATIVE_DRAWS: usize = 1_000;

/// One fold's links together with the instances they reference.
///
/// Caches are shared behind `Arc` so concurrent runs over the same fold never
/// copy instance data.
#[derive(Debug, Clone, Default)]
pub struct FoldData {
    pub mapping: Mapping,
    pub source: Arc<MemoryCache>,
    pub target: Arc<MemoryCache>,
}

impl FoldData {
    pub fn new(mapping: Mapping, source: MemoryCache, target: MemoryCache) -> Self {
        Self {
            mapping,
            source: Arc::new(source),
            target: Arc::new(target),
        }
    }

    /// Every linked source and target is present in the fold's caches.
    pub fn is_consistent(&self) -> bool {
        self.mapping
            .pairs()
            .all(|(s, t, _)| self.source.contains_uri(s) && self.target.contains_uri(t))
    }

    /// The fold's mapping as a gold standard over the fold's own URIs.
    pub fn gold_standard(&self) -> GoldStandard {
        GoldStandard::new(
            self.mapping.clone(),
            self.source.all_uris(),
            self.target.all_uris(),
        )
    }
}

/// Build a random generator, seeded when a seed is given.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Partitions reference mappings into folds.
#[derive(Debug, Clone)]
pub struct FoldGenerator {
    folds: usize,
    with_negative_examples: bool,
    seed: Option<u64>,
    max_negative_draws: usize,
}

impl FoldGenerator {
    pub fn new(folds: usize) -> Self {
        Self {
            folds,
            with_negative_examples: false,
            seed: None,
            max_negative_draws: DEFAULT_MAX_NEGATIVE_DRAWS,
        }
    }

    pub fn with_negative_examples(mut self, enabled: bool) -> Self {
        self.with_negative_examples = enabled;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_negative_draws(mut self, draws: usize) -> Self {
        self.max_negative_draws = draws;
        self
    }

    pub fn folds(&self) -> usize {
        self.folds
    }

    /// Generate `k` folds with their fold-local caches.
    pub fn generate(
        &self,
        reference: &Mapping,
        source: &dyn Cache,
        target: &dyn Cache,
    ) -> Result<Vec<FoldData>, FoldError> {
        let mut rng = make_rng(self.seed);
        let mappings = self.generate_mappings(reference, source, target, &mut rng)?;
        Ok(fold_data_from_caches(mappings, source, target))
    }

    /// Generate the fold mappings only, drawing from `rng`.
    pub fn generate_mappings(
        &self,
        reference: &Mapping,
        source: &dyn Cache,
        target: &dyn Cache,
        rng: &mut impl Rng,
    ) -> Result<Vec<Mapping>, FoldError> {
        let k = self.folds;
        if k < 2 {
            return Err(FoldError::InvalidFoldCount { folds: k });
        }

        let cleaned = remove_dangling_links(reference, source, target);
        let pool: Vec<String> = cleaned.pairs().map(|(_, t, _)| t.to_string()).collect();
        let fold_size = cleaned.source_count() / k;
        if fold_size == 0 {
            tracing::warn!(
                sources = cleaned.source_count(),
                folds = k,
                "fewer reference sources than folds, some folds will be empty"
            );
        }

        let sampler = NegativeSampler {
            pool: &pool,
            reference: &cleaned,
            target,
            max_draws: self.max_negative_draws,
        };

        let mut remaining = cleaned.clone();
        let mut folds = Vec::with_capacity(k);
        for fold_index in 0..k {
            let is_test_fold = fold_index == k - 1;
            let keys: Vec<String> = remaining.sources().map(str::to_string).collect();
            let amount = fold_size.min(keys.len());
            let mut picked = rand::seq::index::sample(rng, keys.len(), amount).into_vec();
            picked.sort_unstable();

            let mut fold = Mapping::new();
            for index in picked {
                let key = &keys[index];
                let negative = self.with_negative_examples && !is_test_fold && index % 2 == 1;
                if let Some(row) = remaining.remove_source(key) {
                    sampler.place(&mut fold, key, &row, negative, rng)?;
                }
            }
            folds.push(fold);
        }

        // Sources left over by the integer division go round-robin.
        let leftovers: Vec<String> = remaining.sources().map(str::to_string).collect();
        for (position, key) in leftovers.iter().enumerate() {
            let fold_index = position % k;
            let negative =
                self.with_negative_examples && fold_index != k - 1 && position % 2 == 1;
            if let Some(row) = remaining.remove_source(key) {
                sampler.place(&mut folds[fold_index], key, &row, negative, rng)?;
            }
        }

        tracing::debug!(
            folds = k,
            fold_size,
            leftovers = leftovers.len(),
            negatives = self.with_negative_examples,
            "generated fold mappings"
        );
        Ok(folds)
    }
}

/// Draws negative targets by rejection sampling over the reference target pool.
struct NegativeSampler<'a> {
    pool: &'a [String],
    reference: &'a Mapping,
    target: &'a dyn Cache,
    max_draws: usize,
}

impl NegativeSampler<'_> {
    fn place(
        &self,
        fold: &mut Mapping,
        key: &str,
        row: &std::collections::BTreeMap<String, f64>,
        negative: bool,
        rng: &mut impl Rng,
    ) -> Result<(), FoldError> {
        if negative {
            let target = self.draw(key, rng)?;
            fold.add(key, target, 0.0);
        } else {
            for t in row.keys() {
                fold.add(key, t.clone(), 1.0);
            }
        }
        Ok(())
    }

    /// A target that is not a true match for `source` and exists in the target cache.
    fn draw(&self, source: &str, rng: &mut impl Rng) -> Result<String, FoldError> {
        let exhausted = || FoldError::NoNegativeCandidate {
            source_uri: source.to_string(),
            attempts: self.max_draws,
        };
        if self.pool.is_empty() {
            return Err(exhausted());
        }

        let mut previous = None;
        for _ in 0..self.max_draws {
            let index = rng.gen_range(0..self.pool.len());
            if previous == Some(index) {
                continue;
            }
            previous = Some(index);

            let candidate = &self.pool[index];
            if !self.reference.contains(source, candidate) && self.target.contains_uri(candidate) {
                return Ok(candidate.clone());
            }
        }
        Err(exhausted())
    }
}

/// Drop links whose source or target instance is missing from the caches.
pub fn remove_dangling_links(map: &Mapping, source: &dyn Cache, target: &dyn Cache) -> Mapping {
    let mut result = Mapping::new();
    let mut dropped = 0usize;
    for (s, t, score) in map.pairs() {
        if source.contains_uri(s) && target.contains_uri(t) {
            result.add(s, t, score);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::warn!(dropped, "removed reference links without instances");
    }
    result
}

/// Build each fold's caches by copying only the referenced instances.
pub fn fold_data_from_caches(
    mappings: Vec<Mapping>,
    source: &dyn Cache,
    target: &dyn Cache,
) -> Vec<FoldData> {
    mappings
        .into_iter()
        .map(|mapping| {
            let mut source_cache = MemoryCache::new();
            let mut target_cache = MemoryCache::new();
            for (s, row) in mapping.rows() {
                if !source_cache.copy_from(source, s) {
                    tracing::warn!(uri = s, "instance missing from source cache");
                    continue;
                }
                for t in row.keys() {
                    if !target_cache.copy_from(target, t) {
                        tracing::warn!(uri = %t, "instance missing from target cache");
                    }
                }
            }
            FoldData::new(mapping, source_cache, target_cache)
        })
        .collect()
}
