//! Pseudo F-measure: a label-free objective for unsupervised learners.
//!
//! Pseudo-precision rewards one link per source, pseudo-recall rewards
//! covering as many source and target instances as possible.

use std::collections::BTreeSet;

use crate::cache::Cache;
use crate::mapping::Mapping;
use crate::measure::f_beta;

/// An objective that scores a mapping without a gold standard.
pub trait PseudoMeasure: Send + Sync {
    fn calculate(&self, predictions: &Mapping, source: &dyn Cache, target: &dyn Cache) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct PseudoFMeasure {
    pub beta: f64,
}

impl Default for PseudoFMeasure {
    fn default() -> Self {
        Self { beta: 1.0 }
    }
}

impl PseudoFMeasure {
    /// Linked sources divided by links.
    pub fn precision(&self, predictions: &Mapping) -> f64 {
        let links = predictions.size();
        if links == 0 {
            return 0.0;
        }
        predictions.source_count() as f64 / links as f64
    }

    /// Linked instances on both sides divided by all instances.
    pub fn recall(&self, predictions: &Mapping, source: &dyn Cache, target: &dyn Cache) -> f64 {
        let universe = source.len() + target.len();
        if universe == 0 {
            return 0.0;
        }
        let linked_targets: BTreeSet<&str> = predictions.target_uris();
        (predictions.source_count() + linked_targets.len()) as f64 / universe as f64
    }
}

impl PseudoMeasure for PseudoFMeasure {
    fn calculate(&self, predictions: &Mapping, source: &dyn Cache, target: &dyn Cache) -> f64 {
        f_beta(
            self.precision(predictions),
            self.recall(predictions, source, target),
            self.beta,
        )
    }
}
