//! Qualitative measures of predicted mappings against a gold standard.
//!
//! All ratios resolve empty denominators to `0.0` instead of failing, so empty
//! folds and empty predictions score as zero.

pub mod pseudo;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::mapping::{GoldStandard, Mapping};

/// Measures reported per evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureType {
    Precision,
    Recall,
    FMeasure,
    Accuracy,
}

impl MeasureType {
    pub const ALL: [MeasureType; 4] = [
        MeasureType::Precision,
        MeasureType::Recall,
        MeasureType::FMeasure,
        MeasureType::Accuracy,
    ];
}

impl fmt::Display for MeasureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MeasureType::Precision => "precision",
            MeasureType::Recall => "recall",
            MeasureType::FMeasure => "f_measure",
            MeasureType::Accuracy => "accuracy",
        };
        f.write_str(name)
    }
}

impl FromStr for MeasureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "precision" | "p" => Ok(MeasureType::Precision),
            "recall" | "r" => Ok(MeasureType::Recall),
            "f_measure" | "fmeasure" | "f1" => Ok(MeasureType::FMeasure),
            "accuracy" | "acc" => Ok(MeasureType::Accuracy),
            other => Err(format!("unknown measure \"{other}\"")),
        }
    }
}

/// Number of predicted links that are positive in the gold standard.
pub fn true_positives(predictions: &Mapping, gold: &GoldStandard) -> usize {
    predictions
        .pairs()
        .filter(|(s, t, _)| gold.is_positive(s, t))
        .count()
}

/// `|predictions ∩ gold positives| / |predictions|`.
pub fn precision(predictions: &Mapping, gold: &GoldStandard) -> f64 {
    let predicted = predictions.size();
    if predicted == 0 {
        return 0.0;
    }
    true_positives(predictions, gold) as f64 / predicted as f64
}

/// `|predictions ∩ gold positives| / |gold positives|`, zero for empty predictions.
pub fn recall(predictions: &Mapping, gold: &GoldStandard) -> f64 {
    let positives = gold.positive_count();
    if predictions.is_empty() || positives == 0 {
        return 0.0;
    }
    true_positives(predictions, gold) as f64 / positives as f64
}

/// Weighted harmonic mean of precision and recall.
pub fn f_beta(precision: f64, recall: f64, beta: f64) -> f64 {
    let beta2 = beta * beta;
    if precision + recall > 0.0 {
        (1.0 + beta2) * precision * recall / (beta2 * precision + recall)
    } else {
        0.0
    }
}

pub fn f_measure(predictions: &Mapping, gold: &GoldStandard, beta: f64) -> f64 {
    f_beta(precision(predictions, gold), recall(predictions, gold), beta)
}

/// `(TP + TN) / (|sources| · |targets|)` over the gold standard's universe.
pub fn accuracy(predictions: &Mapping, gold: &GoldStandard) -> f64 {
    let universe = gold.source_uris.len() * gold.target_uris.len();
    if universe == 0 {
        return 0.0;
    }
    let tp = true_positives(predictions, gold);
    let false_positives = predictions.size() - tp;
    let false_negatives = gold.positive_count().saturating_sub(tp);
    let tn = universe.saturating_sub(tp + false_positives + false_negatives);
    (tp + tn) as f64 / universe as f64
}

/// Computes a chosen set of measures for one prediction.
#[derive(Debug, Clone, Copy)]
pub struct QualitativeEvaluator {
    pub beta: f64,
}

impl Default for QualitativeEvaluator {
    fn default() -> Self {
        Self { beta: 1.0 }
    }
}

impl QualitativeEvaluator {
    pub fn new(beta: f64) -> Self {
        Self { beta }
    }

    /// Score `predictions` after dropping links outside the gold universe.
    pub fn evaluate(
        &self,
        predictions: &Mapping,
        gold: &GoldStandard,
        measures: &[MeasureType],
    ) -> BTreeMap<MeasureType, f64> {
        let predictions = gold.filter_predictions(predictions);
        measures
            .iter()
            .map(|measure| {
                let score = match measure {
                    MeasureType::Precision => precision(&predictions, gold),
                    MeasureType::Recall => recall(&predictions, gold),
                    MeasureType::FMeasure => f_measure(&predictions, gold, self.beta),
                    MeasureType::Accuracy => accuracy(&predictions, gold),
                };
                (*measure, score)
            })
            .collect()
    }

    pub fn f_measure(&self, predictions: &Mapping, gold: &GoldStandard) -> f64 {
        f_measure(&gold.filter_predictions(predictions), gold, self.beta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold() -> GoldStandard {
        GoldStandard::from_mapping(Mapping::from_links([("s1", "t1", 1.0), ("s2", "t2", 1.0)]))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn partial_prediction_scores() {
        let a = Mapping::from_links([("s1", "t1", 1.0)]);
        let b = Mapping::from_links([("s1", "t1", 1.0), ("s2", "t2", 1.0)]);
        let gold = gold();

        assert!(approx(precision(&a, &gold), 1.0));
        assert!(approx(recall(&a, &gold), 0.5));
        assert!(approx(f_measure(&a, &gold, 1.0), 0.667));
        assert!(approx(f_measure(&b, &gold, 1.0), 1.0));
    }

    #[test]
    fn empty_predictions_score_zero() {
        let empty = Mapping::new();
        let scores = QualitativeEvaluator::default().evaluate(
            &empty,
            &gold(),
            &[MeasureType::Precision, MeasureType::Recall, MeasureType::FMeasure],
        );
        assert!(scores.values().all(|&v| v == 0.0));
    }

    #[test]
    fn f_measure_is_zero_without_recall() {
        assert_eq!(f_beta(1.0, 0.0, 1.0), 0.0);
        assert_eq!(f_beta(0.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn empty_gold_scores_zero() {
        let gold = GoldStandard::default();
        let predictions = Mapping::from_links([("s1", "t1", 1.0)]);
        let scores = QualitativeEvaluator::default().evaluate(&predictions, &gold, &MeasureType::ALL);
        assert!(scores.values().all(|&v| v == 0.0));
    }

    #[test]
    fn negative_gold_links_are_not_positives() {
        let gold = GoldStandard::from_mapping(Mapping::from_links([
            ("s1", "t1", 1.0),
            ("s1", "t2", 0.0),
        ]));
        let predictions = Mapping::from_links([("s1", "t2", 1.0)]);
        assert_eq!(precision(&predictions, &gold), 0.0);
        assert_eq!(gold.positive_count(), 1);
    }

    #[test]
    fn accuracy_counts_true_negatives() {
        // Universe 2x2, gold positives s1-t1 and s2-t2, predicting s1-t1 only.
        let predictions = Mapping::from_links([("s1", "t1", 1.0)]);
        assert!(approx(accuracy(&predictions, &gold()), 0.75));
    }

    #[test]
    fn predictions_outside_universe_are_ignored() {
        let predictions = Mapping::from_links([("s1", "t1", 1.0), ("x", "y", 1.0)]);
        let scores =
            QualitativeEvaluator::default().evaluate(&predictions, &gold(), &[MeasureType::Precision]);
        assert!(approx(scores[&MeasureType::Precision], 1.0));
    }

    #[test]
    fn measure_names_parse() {
        assert_eq!("F-Measure".parse::<MeasureType>(), Ok(MeasureType::FMeasure));
        assert_eq!("precision".parse::<MeasureType>(), Ok(MeasureType::Precision));
        assert!("mcc".parse::<MeasureType>().is_err());
    }
}
