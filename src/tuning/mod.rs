//! Hyperparameter search over a candidate grid.
//!
//! [`ParameterGrid`] expands candidate lists into every combination;
//! [`Tuner`] trains one model per combination on an inner split of a training
//! fold and keeps the combination with the highest F-measure.

pub mod parameter;

use crate::algorithm::{AlgorithmResult, TaskAlgorithm, TrainingContext, train};
use crate::fold::FoldData;
use crate::fold::assemble::split_for_tuning;
use crate::measure::QualitativeEvaluator;

use self::parameter::{LearningParameter, ParameterCandidates, merge};

/// Default ratio between a training fold and its tune-train part.
pub const DEFAULT_TUNE_SPLIT: f64 = 5.0;

/// One parameter assignment per grid cell.
pub type Assignment = Vec<LearningParameter>;

pub struct ParameterGrid;

impl ParameterGrid {
    /// The cartesian product of every axis' candidate values.
    ///
    /// No axes yield one empty assignment; an axis without candidates yields
    /// no assignments at all.
    pub fn build(axes: &[ParameterCandidates]) -> Vec<Assignment> {
        axes.iter().fold(vec![Vec::new()], |partial, axis| {
            let mut next = Vec::with_capacity(partial.len() * axis.candidates.len());
            for prefix in &partial {
                for value in &axis.candidates {
                    let mut assignment = prefix.clone();
                    assignment.push(axis.parameter.with_value(value.clone()));
                    next.push(assignment);
                }
            }
            next
        })
    }

    /// Number of assignments [`build`](Self::build) would produce.
    pub fn cardinality(axes: &[ParameterCandidates]) -> usize {
        axes.iter().map(|axis| axis.candidates.len()).product()
    }
}

/// The parameters chosen for one training fold.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningOutcome {
    pub parameters: Vec<LearningParameter>,
    /// F-measure on the tune-test split, `None` when no search happened.
    pub f_measure: Option<f64>,
    /// Number of grid cells that trained and scored successfully.
    pub evaluated: usize,
}

impl TuningOutcome {
    fn fixed(parameters: Vec<LearningParameter>) -> Self {
        Self {
            parameters,
            f_measure: None,
            evaluated: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Tuner {
    evaluator: QualitativeEvaluator,
    split: f64,
}

impl Default for Tuner {
    fn default() -> Self {
        Self::new(QualitativeEvaluator::default(), DEFAULT_TUNE_SPLIT)
    }
}

impl Tuner {
    pub fn new(evaluator: QualitativeEvaluator, split: f64) -> Self {
        Self { evaluator, split }
    }

    /// Pick the best grid assignment for `task` on `training`.
    ///
    /// Cells are trained in parallel. Ties go to the cell that comes first in
    /// grid order. Failing cells are skipped; when no cell succeeds, or the
    /// task has no grid, its fixed parameters are returned.
    pub fn select_best(
        &self,
        task: &TaskAlgorithm,
        training: &FoldData,
        context: &TrainingContext<'_>,
    ) -> TuningOutcome {
        use rayon::prelude::*;

        let axes = match task.parameter_space.as_deref() {
            Some(axes) if !axes.is_empty() => axes,
            _ => return TuningOutcome::fixed(task.parameters.clone()),
        };
        let grid = ParameterGrid::build(axes);
        let (tune_train, tune_test) = split_for_tuning(training, self.split);
        tracing::debug!(
            algorithm = %task.name,
            cells = grid.len(),
            tune_train = tune_train.mapping.size(),
            tune_test = tune_test.mapping.size(),
            "tuning"
        );

        let scores: Vec<Option<f64>> = grid
            .par_iter()
            .map(|assignment| {
                let parameters = merge(&task.parameters, assignment);
                match self.score_cell(task, &parameters, &tune_train, &tune_test, context) {
                    Ok(score) => Some(score),
                    Err(e) => {
                        tracing::warn!(algorithm = %task.name, error = %e, "skipping grid cell");
                        None
                    }
                }
            })
            .collect();

        let mut best: Option<(usize, f64)> = None;
        for (index, score) in scores.iter().enumerate() {
            if let Some(score) = *score {
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((index, score));
                }
            }
        }

        let evaluated = scores.iter().filter(|s| s.is_some()).count();
        match best {
            Some((index, score)) => TuningOutcome {
                parameters: merge(&task.parameters, &grid[index]),
                f_measure: Some(score),
                evaluated,
            },
            None => {
                tracing::warn!(algorithm = %task.name, "no grid cell succeeded, using fixed parameters");
                TuningOutcome::fixed(task.parameters.clone())
            }
        }
    }

    fn score_cell(
        &self,
        task: &TaskAlgorithm,
        parameters: &[LearningParameter],
        tune_train: &FoldData,
        tune_test: &FoldData,
        context: &TrainingContext<'_>,
    ) -> AlgorithmResult<f64> {
        let mut learner = task.learner()?;
        let model = train(&mut learner, parameters, tune_train, context)?;
        let predictions =
            learner.predict(tune_test.source.as_ref(), tune_test.target.as_ref(), &model)?;
        Ok(self
            .evaluator
            .f_measure(&predictions, &tune_test.gold_standard()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::ImplementationType;
    use crate::algorithm::threshold::{self, ThresholdFactory};
    use crate::cache::{Instance, MemoryCache};
    use crate::dataset::LinkConfiguration;
    use crate::mapping::Mapping;
    use crate::measure::pseudo::PseudoFMeasure;
    use crate::tuning::parameter::ParamValue;
    use std::sync::Arc;

    fn axis(name: &str, n: usize) -> ParameterCandidates {
        ParameterCandidates::new(
            LearningParameter::float(name, 0.0, 0.0, 10.0, 1.0),
            (0..n).map(|i| ParamValue::Float(i as f64)).collect(),
        )
    }

    #[test]
    fn grid_is_cartesian_product() {
        let axes = vec![axis("a", 2), axis("b", 3), axis("c", 1)];
        let grid = ParameterGrid::build(&axes);
        assert_eq!(grid.len(), 6);
        assert_eq!(ParameterGrid::cardinality(&axes), 6);
        assert!(grid.iter().all(|cell| cell.len() == 3));

        let mut distinct: Vec<String> = grid
            .iter()
            .map(|cell| cell.iter().map(|p| p.value.to_string()).collect::<Vec<_>>().join(","))
            .collect();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), 6);
    }

    #[test]
    fn empty_grid_has_one_empty_assignment() {
        let grid = ParameterGrid::build(&[]);
        assert_eq!(grid, vec![Vec::<LearningParameter>::new()]);
    }

    #[test]
    fn axis_without_candidates_empties_the_grid() {
        assert!(ParameterGrid::build(&[axis("a", 2), axis("b", 0)]).is_empty());
    }

    fn fold() -> FoldData {
        let words = ["red apple", "green pear", "blue plum", "ripe fig", "sour lime"];
        let mut source = MemoryCache::new();
        let mut target = MemoryCache::new();
        let mut mapping = Mapping::new();
        for (i, w) in words.iter().enumerate() {
            source.add_instance(Instance::new(format!("s{i}")).with_property("name", *w));
            target.add_instance(Instance::new(format!("t{i}")).with_property("label", *w));
            mapping.add(format!("s{i}"), format!("t{i}"), 1.0);
        }
        FoldData::new(mapping, source, target)
    }

    #[test]
    fn tuner_without_grid_keeps_fixed_parameters() {
        let fixed = threshold::default_parameters();
        let task = TaskAlgorithm::new(
            "t",
            ImplementationType::SupervisedBatch,
            Arc::new(ThresholdFactory),
        )
        .with_parameters(fixed.clone());
        let configuration = LinkConfiguration::default();
        let pseudo = PseudoFMeasure::default();
        let context = TrainingContext {
            configuration: &configuration,
            pseudo_measure: &pseudo,
            oracle: None,
        };
        let outcome = Tuner::default().select_best(&task, &fold(), &context);
        assert_eq!(outcome.parameters, fixed);
        assert_eq!(outcome.f_measure, None);
    }

    #[test]
    fn tuner_prefers_first_of_equal_cells() {
        let base = threshold::default_parameters();
        let min = parameter::find(&base, threshold::PARAM_MIN_THRESHOLD)
            .cloned()
            .unwrap();
        let task = TaskAlgorithm::new(
            "t",
            ImplementationType::SupervisedBatch,
            Arc::new(ThresholdFactory),
        )
        .with_parameters(base)
        .with_parameter_space(vec![ParameterCandidates::new(
            min,
            vec![ParamValue::Float(0.3), ParamValue::Float(0.4)],
        )]);
        let configuration = LinkConfiguration::default();
        let pseudo = PseudoFMeasure::default();
        let context = TrainingContext {
            configuration: &configuration,
            pseudo_measure: &pseudo,
            oracle: None,
        };

        let outcome = Tuner::default().select_best(&task, &fold(), &context);
        assert_eq!(outcome.evaluated, 2);
        let chosen = parameter::find(&outcome.parameters, threshold::PARAM_MIN_THRESHOLD).unwrap();
        assert_eq!(chosen.value, ParamValue::Float(0.3));
        assert_eq!(outcome.f_measure, Some(1.0));
    }
}
