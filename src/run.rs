//! Evaluation records and the final summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::algorithm::ImplementationType;
use crate::measure::MeasureType;
use crate::stats::SignificanceTable;

/// Whether a run produced scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed { message: String },
}

/// One (algorithm, dataset, fold) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub algorithm: String,
    /// The declared implementation type; `None` when it did not parse.
    pub implementation_type: Option<ImplementationType>,
    pub dataset: String,
    /// Test fold index; `None` for evaluation without folds.
    pub fold: Option<usize>,
    pub scores: BTreeMap<MeasureType, f64>,
    pub runtime_secs: f64,
    pub model_complexity: usize,
    /// The learned link specification, rendered.
    pub model: Option<String>,
    #[serde(flatten)]
    pub status: RunStatus,
}

impl EvaluationRun {
    pub fn failed(
        algorithm: impl Into<String>,
        implementation_type: Option<ImplementationType>,
        dataset: impl Into<String>,
        fold: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            implementation_type,
            dataset: dataset.into(),
            fold,
            scores: BTreeMap::new(),
            runtime_secs: 0.0,
            model_complexity: 0,
            model: None,
            status: RunStatus::Failed {
                message: message.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RunStatus::Failed { .. })
    }

    pub fn score(&self, measure: MeasureType) -> Option<f64> {
        self.scores.get(&measure).copied()
    }

    fn sort_key(&self) -> (&str, &str, Option<usize>) {
        (&self.dataset, &self.algorithm, self.fold)
    }
}

/// Mean and standard deviation of one measure across folds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub mean: f64,
    pub std_dev: f64,
    pub runs: usize,
}

impl Aggregate {
    fn of(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                runs: 0,
            };
        }
        Self {
            mean: values.mean(),
            std_dev: values.population_std_dev(),
            runs: n,
        }
    }
}

/// Key of an aggregate row: (algorithm, dataset, measure).
pub type AggregateKey = (String, String, MeasureType);

/// Everything an evaluation produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub runs: Vec<EvaluationRun>,
    pub folds: usize,
    pub significance: SignificanceTable,
}

impl Summary {
    /// A summary whose runs are ordered by dataset, algorithm and fold.
    pub fn new(mut runs: Vec<EvaluationRun>, folds: usize, significance: SignificanceTable) -> Self {
        runs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self {
            runs,
            folds,
            significance,
        }
    }

    /// Symmetric in `a` and `b`.
    pub fn p_value(&self, dataset: &str, a: &str, b: &str) -> Option<f64> {
        self.significance.p_value(dataset, a, b)
    }

    pub fn failed_runs(&self) -> impl Iterator<Item = &EvaluationRun> {
        self.runs.iter().filter(|r| r.is_failed())
    }

    pub fn runs_for<'a>(
        &'a self,
        algorithm: &'a str,
        dataset: &'a str,
    ) -> impl Iterator<Item = &'a EvaluationRun> {
        self.runs
            .iter()
            .filter(move |r| r.algorithm == algorithm && r.dataset == dataset)
    }

    /// Per-measure mean and standard deviation over completed runs.
    pub fn aggregate(&self) -> BTreeMap<AggregateKey, Aggregate> {
        let mut values: BTreeMap<AggregateKey, Vec<f64>> = BTreeMap::new();
        for run in self.runs.iter().filter(|r| !r.is_failed()) {
            for (measure, score) in &run.scores {
                values
                    .entry((run.algorithm.clone(), run.dataset.clone(), *measure))
                    .or_default()
                    .push(*score);
            }
        }
        values
            .into_iter()
            .map(|(key, v)| (key, Aggregate::of(&v)))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(algorithm: &str, fold: usize, f: f64) -> EvaluationRun {
        EvaluationRun {
            algorithm: algorithm.into(),
            implementation_type: Some(ImplementationType::SupervisedBatch),
            dataset: "d".into(),
            fold: Some(fold),
            scores: BTreeMap::from([(MeasureType::FMeasure, f)]),
            runtime_secs: 0.1,
            model_complexity: 1,
            model: None,
            status: RunStatus::Completed,
        }
    }

    #[test]
    fn runs_are_sorted_regardless_of_completion_order() {
        let summary = Summary::new(
            vec![run("b", 1, 0.5), run("a", 1, 0.5), run("a", 0, 0.5)],
            2,
            SignificanceTable::new(),
        );
        let order: Vec<_> = summary
            .runs
            .iter()
            .map(|r| (r.algorithm.as_str(), r.fold))
            .collect();
        assert_eq!(order, vec![("a", Some(0)), ("a", Some(1)), ("b", Some(1))]);
    }

    #[test]
    fn aggregate_skips_failed_runs() {
        let summary = Summary::new(
            vec![
                run("a", 0, 0.4),
                run("a", 1, 0.8),
                EvaluationRun::failed("a", None, "d", Some(2), "boom"),
            ],
            3,
            SignificanceTable::new(),
        );
        let agg = summary.aggregate();
        let row = agg[&("a".to_string(), "d".to_string(), MeasureType::FMeasure)];
        assert!((row.mean - 0.6).abs() < 1e-12);
        assert!((row.std_dev - 0.2).abs() < 1e-12);
        assert_eq!(row.runs, 2);
        assert_eq!(summary.failed_runs().count(), 1);
    }

    #[test]
    fn single_run_has_zero_spread() {
        let summary = Summary::new(vec![run("a", 0, 0.7)], 1, SignificanceTable::new());
        let row = summary.aggregate()[&("a".to_string(), "d".to_string(), MeasureType::FMeasure)];
        assert!((row.mean - 0.7).abs() < 1e-12);
        assert_eq!(row.std_dev, 0.0);
    }

    #[test]
    fn summary_serializes_status_inline() {
        let summary = Summary::new(
            vec![EvaluationRun::failed("a", None, "d", None, "bad kind")],
            0,
            SignificanceTable::new(),
        );
        let json = summary.to_json().unwrap();
        assert!(json.contains("\"status\": \"failed\""));
        assert!(json.contains("bad kind"));
    }
}
