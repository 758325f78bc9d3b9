//! Evaluation orchestration.
//!
//! The [`Evaluator`] drives every (algorithm × dataset × fold) run: it builds
//! folds, assembles training data, tunes parameters, trains, predicts, scores
//! and finally runs pairwise significance tests per dataset.
//!
//! Datasets run in parallel. Within a dataset all runs execute in parallel and
//! must finish before the dataset's significance tests start. A failing run is
//! recorded as failed and never aborts the batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::algorithm::{TaskAlgorithm, TrainingContext, train};
use crate::dataset::EvaluationData;
use crate::error::{ConfigError, EvalResult, FoldError};
use crate::fold::assemble::FoldAssembler;
use crate::fold::{DEFAULT_MAX_NEGATIVE_DRAWS, FoldData, FoldGenerator};
use crate::mapping::{GoldStandard, Mapping};
use crate::measure::pseudo::PseudoFMeasure;
use crate::measure::{MeasureType, QualitativeEvaluator};
use crate::oracle::{CancellationToken, Oracle};
use crate::run::{EvaluationRun, RunStatus, Summary};
use crate::stats::{SignificanceResult, SignificanceTable, StatisticalComparator};
use crate::tuning::{DEFAULT_TUNE_SPLIT, Tuner};

/// Settings shared by all evaluation entry points.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    pub folds: usize,
    /// Base seed; `None` draws folds from entropy.
    pub seed: Option<u64>,
    /// Sample negatives into the training folds of [`Evaluator::cross_validate`].
    /// The tuned entry point scores every fold and never samples negatives.
    pub with_negative_examples: bool,
    /// Worker threads, 0 for one per core.
    pub threads: usize,
    pub measures: Vec<MeasureType>,
    pub tune_split: f64,
    pub beta: f64,
    pub max_negative_draws: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            folds: 10,
            seed: None,
            with_negative_examples: true,
            threads: 0,
            measures: MeasureType::ALL.to_vec(),
            tune_split: DEFAULT_TUNE_SPLIT,
            beta: 1.0,
            max_negative_draws: DEFAULT_MAX_NEGATIVE_DRAWS,
        }
    }
}

/// Mix a base seed with a dataset name so datasets get independent streams.
pub fn dataset_seed(seed: u64, dataset: &str) -> u64 {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in dataset.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    seed ^ hash
}

/// A finished run plus its predictions, kept for significance testing.
struct RunOutcome {
    run: EvaluationRun,
    predictions: Option<Mapping>,
}

/// Where one run trains and what it is scored against.
struct RunPlan<'a> {
    task: &'a TaskAlgorithm,
    data: &'a EvaluationData,
    fold: Option<usize>,
    training: &'a FoldData,
    test: &'a FoldData,
    gold: &'a GoldStandard,
    tune: bool,
}

pub struct Evaluator {
    config: EvaluatorConfig,
    oracle: Option<Arc<dyn Oracle>>,
    cancel: CancellationToken,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            oracle: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `oracle` for active learners instead of the simulated one.
    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn pool(&self) -> EvalResult<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| {
                ConfigError::Invalid {
                    message: format!("cannot start {} worker threads: {e}", self.config.threads),
                }
                .into()
            })
    }

    fn fold_generator(&self, dataset: &str, negatives: bool) -> FoldGenerator {
        FoldGenerator::new(self.config.folds)
            .with_negative_examples(negatives)
            .with_seed(self.config.seed.map(|seed| dataset_seed(seed, dataset)))
            .with_max_negative_draws(self.config.max_negative_draws)
    }

    /// Train every algorithm on each dataset's training mapping and score
    /// predictions over the full caches, without folds.
    pub fn evaluate(
        &self,
        tasks: &[TaskAlgorithm],
        datasets: &[EvaluationData],
    ) -> EvalResult<Summary> {
        let pool = self.pool()?;
        let runs = pool.install(|| {
            datasets
                .par_iter()
                .flat_map(|data| {
                    let full = FoldData {
                        mapping: data.training_mapping().clone(),
                        source: Arc::clone(&data.source),
                        target: Arc::clone(&data.target),
                    };
                    let gold = data.gold_standard();
                    tasks
                        .par_iter()
                        .map(|task| {
                            self.execute(&RunPlan {
                                task,
                                data,
                                fold: None,
                                training: &full,
                                test: &full,
                                gold: &gold,
                                tune: false,
                            })
                            .run
                        })
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        });
        Ok(Summary::new(runs, 0, SignificanceTable::new()))
    }

    /// Cross-validate one algorithm: the last fold is held out, the rest train.
    pub fn cross_validate(
        &self,
        task: &TaskAlgorithm,
        datasets: &[EvaluationData],
    ) -> EvalResult<Summary> {
        let pool = self.pool()?;
        let runs = pool.install(|| {
            datasets
                .par_iter()
                .map(|data| self.cross_validate_dataset(task, data))
                .collect::<Vec<_>>()
        });
        Ok(Summary::new(runs, self.config.folds, SignificanceTable::new()))
    }

    fn cross_validate_dataset(&self, task: &TaskAlgorithm, data: &EvaluationData) -> EvaluationRun {
        let prepared = self
            .fold_generator(&data.name, self.config.with_negative_examples)
            .generate(&data.reference, data.source.as_ref(), data.target.as_ref());
        let folds = match prepared {
            Ok(folds) => folds,
            Err(e) => return failed_for(task, data, None, &e.to_string()),
        };
        let test_index = folds.len() - 1;
        let assembler = FoldAssembler::new(data.source.as_ref(), data.target.as_ref());
        let training = match assembler.training_fold(&folds, test_index) {
            Ok(training) => training,
            Err(e) => return failed_for(task, data, Some(test_index), &e.to_string()),
        };
        let gold = folds[test_index].gold_standard();
        self.execute(&RunPlan {
            task,
            data,
            fold: Some(test_index),
            training: &training,
            test: &folds[test_index],
            gold: &gold,
            tune: false,
        })
        .run
    }

    /// Full k-fold evaluation: every fold is the test fold once, every
    /// algorithm is tuned on the remaining folds, and every algorithm pair is
    /// compared with McNemar's test per dataset.
    pub fn cross_validate_with_tuning_and_statistical_test(
        &self,
        tasks: &[TaskAlgorithm],
        datasets: &[EvaluationData],
    ) -> EvalResult<Summary> {
        let pool = self.pool()?;
        let per_dataset = pool.install(|| {
            datasets
                .par_iter()
                .map(|data| self.tuned_dataset(tasks, data))
                .collect::<EvalResult<Vec<_>>>()
        })?;

        let mut runs = Vec::new();
        let mut significance = SignificanceTable::new();
        for (dataset_runs, results) in per_dataset {
            runs.extend(dataset_runs);
            significance.extend(results);
        }
        Ok(Summary::new(runs, self.config.folds, significance))
    }

    fn tuned_dataset(
        &self,
        tasks: &[TaskAlgorithm],
        data: &EvaluationData,
    ) -> EvalResult<(Vec<EvaluationRun>, Vec<SignificanceResult>)> {
        tracing::info!(dataset = %data.name, algorithms = tasks.len(), folds = self.config.folds, "evaluating dataset");

        let (folds, training) = match self.tuned_folds(data) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(dataset = %data.name, error = %e, "could not build folds");
                let runs = tasks
                    .iter()
                    .map(|task| failed_for(task, data, None, &e.to_string()))
                    .collect();
                return Ok((runs, Vec::new()));
            }
        };
        let golds: Vec<GoldStandard> = folds.iter().map(FoldData::gold_standard).collect();

        let jobs: Vec<(usize, &TaskAlgorithm)> = (0..folds.len())
            .flat_map(|i| tasks.iter().map(move |task| (i, task)))
            .collect();
        let outcomes: Vec<(usize, RunOutcome)> = jobs
            .par_iter()
            .map(|&(i, task)| {
                let outcome = self.execute(&RunPlan {
                    task,
                    data,
                    fold: Some(i),
                    training: &training[i],
                    test: &folds[i],
                    gold: &golds[i],
                    tune: true,
                });
                (i, outcome)
            })
            .collect();

        let mut predictions: Vec<BTreeMap<String, Mapping>> = vec![BTreeMap::new(); folds.len()];
        let mut runs = Vec::with_capacity(outcomes.len());
        for (i, outcome) in outcomes {
            if let Some(mapping) = outcome.predictions {
                predictions[i].insert(
                    outcome.run.algorithm.clone(),
                    golds[i].filter_predictions(&mapping),
                );
            }
            runs.push(outcome.run);
        }

        let mut comparator = StatisticalComparator::new(data.name.clone());
        for (fold_predictions, gold) in predictions.iter().zip(&golds) {
            comparator.add_fold(fold_predictions, gold);
        }
        let results = comparator.finish()?;
        tracing::info!(dataset = %data.name, runs = runs.len(), comparisons = results.len(), "dataset complete");
        Ok((runs, results))
    }

    /// Test folds and their training folds for the tuned entry point. Every
    /// fold is scored here, so none of them carries negatives.
    fn tuned_folds(&self, data: &EvaluationData) -> Result<(Vec<FoldData>, Vec<FoldData>), FoldError> {
        let folds = self.fold_generator(&data.name, false).generate(
            &data.reference,
            data.source.as_ref(),
            data.target.as_ref(),
        )?;
        let assembler = FoldAssembler::new(data.source.as_ref(), data.target.as_ref());
        let training = (0..folds.len())
            .map(|i| assembler.training_fold(&folds, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((folds, training))
    }

    fn execute(&self, plan: &RunPlan<'_>) -> RunOutcome {
        if self.cancel.is_cancelled() {
            return RunOutcome {
                run: failed_for(plan.task, plan.data, plan.fold, "cancelled"),
                predictions: None,
            };
        }
        match self.try_execute(plan) {
            Ok((run, predictions)) => RunOutcome {
                run,
                predictions: Some(predictions),
            },
            Err(e) => {
                tracing::warn!(
                    algorithm = %plan.task.name,
                    dataset = %plan.data.name,
                    fold = ?plan.fold,
                    error = %e,
                    "run failed"
                );
                RunOutcome {
                    run: failed_for(plan.task, plan.data, plan.fold, &e.to_string()),
                    predictions: None,
                }
            }
        }
    }

    fn try_execute(&self, plan: &RunPlan<'_>) -> EvalResult<(EvaluationRun, Mapping)> {
        let kind = plan.task.implementation_type()?;
        let pseudo = PseudoFMeasure {
            beta: self.config.beta,
        };
        let context = TrainingContext {
            configuration: &plan.data.configuration,
            pseudo_measure: &pseudo,
            oracle: self.oracle.as_deref(),
        };
        let evaluator = QualitativeEvaluator::new(self.config.beta);

        let parameters = if plan.tune {
            // Grid cells answer from the training fold, never from a human.
            let tuning = TrainingContext {
                oracle: None,
                ..context
            };
            Tuner::new(QualitativeEvaluator::default(), self.config.tune_split)
                .select_best(plan.task, plan.training, &tuning)
                .parameters
        } else {
            plan.task.parameters.clone()
        };
        let started = Instant::now();
        let mut learner = plan.task.learner()?;
        let model = train(&mut learner, &parameters, plan.training, &context)?;
        let predictions = learner.predict(plan.test.source.as_ref(), plan.test.target.as_ref(), &model)?;
        let runtime_secs = started.elapsed().as_secs_f64();

        let scores = evaluator.evaluate(&predictions, plan.gold, &self.config.measures);
        tracing::debug!(
            algorithm = %plan.task.name,
            dataset = %plan.data.name,
            fold = ?plan.fold,
            model = %model.link_spec,
            runtime_secs,
            "run complete"
        );
        let run = EvaluationRun {
            algorithm: plan.task.name.clone(),
            implementation_type: Some(kind),
            dataset: plan.data.name.clone(),
            fold: plan.fold,
            scores,
            runtime_secs,
            model_complexity: model.complexity(),
            model: Some(model.link_spec.to_string()),
            status: RunStatus::Completed,
        };
        Ok((run, predictions))
    }
}

fn failed_for(
    task: &TaskAlgorithm,
    data: &EvaluationData,
    fold: Option<usize>,
    message: &str,
) -> EvaluationRun {
    EvaluationRun::failed(
        task.name.clone(),
        task.implementation_type().ok(),
        data.name.clone(),
        fold,
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::algorithm::threshold::{ThresholdFactory, default_parameters};
    use crate::algorithm::{
        AlgorithmFactory, AlgorithmResult, ImplementationType, LearnedModel, Learner, LinkLearner,
        LinkSpec, SupervisedLearner,
    };
    use crate::cache::{Cache, Instance, MemoryCache};
    use crate::oracle::{OracleResult, SimulatedOracle};
    use crate::tuning::parameter::{LearningParameter, ParamValue, ParameterCandidates};

    const LEARN_TIME: Duration = Duration::from_millis(50);

    /// Takes `LEARN_TIME` to learn and predicts nothing.
    struct SlowFactory;

    struct SlowLearner;

    impl AlgorithmFactory for SlowFactory {
        fn name(&self) -> &str {
            "slow"
        }

        fn create(&self, _kind: ImplementationType) -> AlgorithmResult<Learner> {
            Ok(Learner::SupervisedBatch(Box::new(SlowLearner)))
        }
    }

    impl LinkLearner for SlowLearner {
        fn name(&self) -> &str {
            "slow"
        }

        fn init(
            &mut self,
            _parameters: &[LearningParameter],
            _source: Arc<dyn Cache>,
            _target: Arc<dyn Cache>,
        ) -> AlgorithmResult<()> {
            Ok(())
        }

        fn predict(
            &self,
            _source: &dyn Cache,
            _target: &dyn Cache,
            _model: &LearnedModel,
        ) -> AlgorithmResult<Mapping> {
            Ok(Mapping::new())
        }
    }

    impl SupervisedLearner for SlowLearner {
        fn learn(&mut self, _training: &Mapping) -> AlgorithmResult<LearnedModel> {
            std::thread::sleep(LEARN_TIME);
            Ok(LearnedModel {
                link_spec: LinkSpec::atomic("slow", "*", 0.5),
                quality: 0.0,
            })
        }
    }

    fn dataset(name: &str, n: usize) -> EvaluationData {
        let mut source = MemoryCache::new();
        let mut target = MemoryCache::new();
        let mut reference = Mapping::new();
        for i in 0..n {
            let label = format!("item{i} group{}", i % 3);
            source.add_instance(Instance::new(format!("s{i}")).with_property("name", &label));
            target.add_instance(Instance::new(format!("t{i}")).with_property("label", &label));
            reference.add(format!("s{i}"), format!("t{i}"), 1.0);
        }
        EvaluationData::new(name, source, target, reference)
    }

    fn config() -> EvaluatorConfig {
        EvaluatorConfig {
            folds: 3,
            seed: Some(7),
            threads: 2,
            ..EvaluatorConfig::default()
        }
    }

    fn task(name: &str, kind: &str) -> TaskAlgorithm {
        TaskAlgorithm::declared(name, kind, Arc::new(ThresholdFactory))
            .with_parameters(default_parameters())
    }

    #[test]
    fn dataset_seeds_differ_by_name() {
        assert_ne!(dataset_seed(1, "a"), dataset_seed(1, "b"));
        assert_eq!(dataset_seed(1, "a"), dataset_seed(1, "a"));
    }

    #[test]
    fn tuned_evaluation_records_every_run() {
        let evaluator = Evaluator::new(config());
        let tasks = vec![
            task("batch", "supervised_batch"),
            task("active", "supervised_active"),
        ];
        let summary = evaluator
            .cross_validate_with_tuning_and_statistical_test(&tasks, &[dataset("d", 12)])
            .unwrap();
        assert_eq!(summary.runs.len(), 6);
        assert_eq!(summary.failed_runs().count(), 0);
        assert!(summary.p_value("d", "batch", "active").is_some());
    }

    #[test]
    fn tuned_folds_hold_out_every_reference_link() {
        let evaluator = Evaluator::new(EvaluatorConfig {
            folds: 4,
            seed: Some(7),
            ..EvaluatorConfig::default()
        });
        assert!(evaluator.config().with_negative_examples);
        let (folds, _) = evaluator.tuned_folds(&dataset("d", 20)).unwrap();

        let positives: usize = folds.iter().map(|f| f.gold_standard().positive_count()).sum();
        assert_eq!(positives, 20);
        assert!(folds
            .iter()
            .all(|f| f.mapping.pairs().all(|(_, _, score)| score == 1.0)));
    }

    #[test]
    fn cross_validation_trains_on_negatives() {
        let evaluator = Evaluator::new(EvaluatorConfig {
            folds: 4,
            seed: Some(7),
            ..EvaluatorConfig::default()
        });
        let data = dataset("d", 20);
        let folds = evaluator
            .fold_generator(&data.name, evaluator.config().with_negative_examples)
            .generate(&data.reference, data.source.as_ref(), data.target.as_ref())
            .unwrap();
        assert!(folds[..3]
            .iter()
            .any(|f| f.mapping.pairs().any(|(_, _, score)| score == 0.0)));
    }

    #[test]
    fn runtime_excludes_tuning() {
        let evaluator = Evaluator::new(EvaluatorConfig {
            folds: 2,
            seed: Some(3),
            threads: 1,
            ..EvaluatorConfig::default()
        });
        let axis = ParameterCandidates::new(
            LearningParameter::float("weight", 0.0, 0.0, 1.0, 0.1),
            (0..8).map(|i| ParamValue::Float(f64::from(i) / 10.0)).collect(),
        );
        let task = TaskAlgorithm::new("slow", ImplementationType::SupervisedBatch, Arc::new(SlowFactory))
            .with_parameter_space(vec![axis]);
        let summary = evaluator
            .cross_validate_with_tuning_and_statistical_test(&[task], &[dataset("d", 6)])
            .unwrap();

        assert_eq!(summary.failed_runs().count(), 0);
        for run in &summary.runs {
            // Eight tuning cells take at least 400ms on one thread; one run takes ~50ms.
            assert!(run.runtime_secs >= LEARN_TIME.as_secs_f64());
            assert!(run.runtime_secs < 0.3, "runtime {} includes tuning", run.runtime_secs);
        }
    }

    /// Counts rounds and answers from a reference.
    struct CountingOracle {
        inner: SimulatedOracle,
        rounds: AtomicUsize,
    }

    impl Oracle for CountingOracle {
        fn classify(&self, examples: &Mapping) -> OracleResult<Mapping> {
            self.rounds.fetch_add(1, Ordering::SeqCst);
            self.inner.classify(examples)
        }
    }

    #[test]
    fn injected_oracle_answers_final_runs_only() {
        let data = dataset("d", 12);
        let oracle = Arc::new(CountingOracle {
            inner: SimulatedOracle::new(data.reference.clone()),
            rounds: AtomicUsize::new(0),
        });
        let evaluator = Evaluator::new(config()).with_oracle(oracle.clone());
        let axis = ParameterCandidates::new(
            LearningParameter::float("min_threshold", 0.3, 0.0, 1.0, 0.05),
            vec![ParamValue::Float(0.2), ParamValue::Float(0.6)],
        );
        let task = task("active", "supervised_active").with_parameter_space(vec![axis]);
        let summary = evaluator
            .cross_validate_with_tuning_and_statistical_test(&[task], &[data])
            .unwrap();

        assert_eq!(summary.failed_runs().count(), 0);
        // One round per fold; the six grid cells use the training folds.
        assert_eq!(oracle.rounds.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn bad_kind_fails_only_its_runs() {
        let evaluator = Evaluator::new(config());
        let tasks = vec![task("good", "supervised_batch"), task("bad", "psychic")];
        let summary = evaluator
            .cross_validate_with_tuning_and_statistical_test(&tasks, &[dataset("d", 9)])
            .unwrap();
        let failed: Vec<_> = summary.failed_runs().collect();
        assert_eq!(failed.len(), 3);
        assert!(failed.iter().all(|r| r.algorithm == "bad"));
        assert_eq!(summary.runs_for("good", "d").count(), 3);
    }

    #[test]
    fn cancellation_marks_runs_failed() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let evaluator = Evaluator::new(config()).with_cancellation(cancel);
        let summary = evaluator
            .evaluate(&[task("t", "supervised_batch")], &[dataset("d", 4)])
            .unwrap();
        assert_eq!(summary.failed_runs().count(), 1);
    }

    #[test]
    fn plain_evaluation_scores_the_full_reference() {
        let evaluator = Evaluator::new(config());
        let summary = evaluator
            .evaluate(&[task("t", "unsupervised")], &[dataset("d", 6)])
            .unwrap();
        let run = &summary.runs[0];
        assert_eq!(run.implementation_type, Some(ImplementationType::Unsupervised));
        assert_eq!(run.fold, None);
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.score(MeasureType::FMeasure).is_some());
    }

    #[test]
    fn cross_validate_holds_out_the_last_fold() {
        let evaluator = Evaluator::new(config());
        let summary = evaluator
            .cross_validate(&task("t", "supervised_batch"), &[dataset("d", 9)])
            .unwrap();
        assert_eq!(summary.runs.len(), 1);
        assert_eq!(summary.runs[0].fold, Some(2));
    }
}
