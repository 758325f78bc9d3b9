//! Training-fold assembly and cache repair.

use crate::cache::{Cache, MemoryCache};
use crate::error::FoldError;
use crate::fold::{FoldData, fold_data_from_caches};
use crate::mapping::Mapping;

/// Unions folds into training data and repairs the resulting caches from the
/// dataset-level caches.
pub struct FoldAssembler<'a> {
    source: &'a dyn Cache,
    target: &'a dyn Cache,
}

impl<'a> FoldAssembler<'a> {
    /// `source` and `target` are the dataset-level caches used for repairs.
    pub fn new(source: &'a dyn Cache, target: &'a dyn Cache) -> Self {
        Self { source, target }
    }

    /// Union every fold except `test_index` into one consistent training fold.
    pub fn training_fold(&self, folds: &[FoldData], test_index: usize) -> Result<FoldData, FoldError> {
        if test_index >= folds.len() {
            return Err(FoldError::IndexOutOfRange {
                index: test_index,
                folds: folds.len(),
            });
        }

        let mut mapping = Mapping::new();
        let mut source = MemoryCache::new();
        let mut target = MemoryCache::new();
        for (index, fold) in folds.iter().enumerate() {
            if index == test_index {
                continue;
            }
            mapping = mapping.union(&fold.mapping);
            source = source.union(fold.source.as_ref());
            target = target.union(fold.target.as_ref());
        }

        let repaired = self.repair(&mapping, &mut source, &mut target);
        if repaired > 0 {
            tracing::warn!(repaired, test_index, "pulled missing instances into training caches");
        }
        Ok(FoldData::new(mapping, source, target))
    }

    /// Copy every instance referenced by `mapping` but missing from the fold
    /// caches out of the dataset caches. Returns the number of copied instances.
    pub fn repair(
        &self,
        mapping: &Mapping,
        source_cache: &mut MemoryCache,
        target_cache: &mut MemoryCache,
    ) -> usize {
        let mut repaired = 0;
        for (s, row) in mapping.rows() {
            for t in row.keys() {
                if !target_cache.contains_uri(t) && target_cache.copy_from(self.target, t) {
                    repaired += 1;
                }
            }
            if !source_cache.contains_uri(s) && source_cache.copy_from(self.source, s) {
                repaired += 1;
            }
        }
        repaired
    }
}

/// Split a training fold into an inner tune-train and tune-test pair.
///
/// Tune-train takes whole source rows, in mapping order, until it holds
/// `ceil(|links| / factor)` links; everything after goes to tune-test. Both
/// halves get caches rebuilt from the training fold's caches.
pub fn split_for_tuning(fold: &FoldData, factor: f64) -> (FoldData, FoldData) {
    let train_size = (fold.mapping.size() as f64 / factor).ceil() as usize;
    let mut tune_train = Mapping::new();
    let mut tune_test = Mapping::new();
    for (s, row) in fold.mapping.rows() {
        if tune_train.size() < train_size {
            tune_train.add_all(s, row);
        } else {
            tune_test.add_all(s, row);
        }
    }

    let mut parts = fold_data_from_caches(
        vec![tune_train, tune_test],
        fold.source.as_ref(),
        fold.target.as_ref(),
    )
    .into_iter();
    let train = parts.next().unwrap_or_default();
    let test = parts.next().unwrap_or_default();
    (train, test)
}
