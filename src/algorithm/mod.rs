//! The learner contract consumed by the evaluation engine.
//!
//! A learning algorithm is a black box that is initialised with parameters and
//! caches, learns a [`LearnedModel`] in one of three modes, and predicts a
//! [`Mapping`] from a model. The mode is a tagged variant ([`Learner`]) chosen
//! once, when a factory builds the learner for a declared
//! [`ImplementationType`].

pub mod registry;
pub mod threshold;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::dataset::LinkConfiguration;
use crate::error::AlgorithmError;
use crate::fold::FoldData;
use crate::mapping::Mapping;
use crate::measure::pseudo::PseudoMeasure;
use crate::oracle::{Oracle, SimulatedOracle};
use crate::tuning::parameter::{LearningParameter, ParameterCandidates};

pub type AlgorithmResult<T> = std::result::Result<T, AlgorithmError>;

/// How a learner obtains its training signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationType {
    SupervisedBatch,
    SupervisedActive,
    Unsupervised,
}

impl fmt::Display for ImplementationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImplementationType::SupervisedBatch => "supervised_batch",
            ImplementationType::SupervisedActive => "supervised_active",
            ImplementationType::Unsupervised => "unsupervised",
        };
        f.write_str(name)
    }
}

impl FromStr for ImplementationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "supervised_batch" | "batch" => Ok(ImplementationType::SupervisedBatch),
            "supervised_active" | "active" => Ok(ImplementationType::SupervisedActive),
            "unsupervised" => Ok(ImplementationType::Unsupervised),
            other => Err(other.to_string()),
        }
    }
}

/// A learned link specification, opaque to the engine apart from its size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Human-readable expression, e.g. `jaccard(name)|0.75`.
    pub expression: String,
    pub threshold: f64,
    /// Number of atomic similarity measures in the expression.
    pub size: usize,
}

impl LinkSpec {
    pub fn atomic(measure: &str, property: &str, threshold: f64) -> Self {
        Self {
            expression: format!("{measure}({property})|{threshold:.4}"),
            threshold,
            size: 1,
        }
    }
}

impl fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// The output of a learning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedModel {
    pub link_spec: LinkSpec,
    /// The learner's own estimate of the model's quality on its training signal.
    pub quality: f64,
}

impl LearnedModel {
    pub fn complexity(&self) -> usize {
        self.link_spec.size
    }
}

/// Operations shared by every learner.
pub trait LinkLearner: Send {
    fn name(&self) -> &str;

    /// Reset the learner with parameters and the caches it learns over.
    fn init(
        &mut self,
        parameters: &[LearningParameter],
        source: Arc<dyn Cache>,
        target: Arc<dyn Cache>,
    ) -> AlgorithmResult<()>;

    fn set_configuration(&mut self, _configuration: &LinkConfiguration) {}

    fn predict(
        &self,
        source: &dyn Cache,
        target: &dyn Cache,
        model: &LearnedModel,
    ) -> AlgorithmResult<Mapping>;
}

/// Learns from a labeled training mapping in one batch.
pub trait SupervisedLearner: LinkLearner {
    fn learn(&mut self, training: &Mapping) -> AlgorithmResult<LearnedModel>;
}

/// Learns from oracle feedback on examples it selects itself.
pub trait ActiveLearner: LinkLearner {
    /// Stateless bootstrap before the first round.
    fn bootstrap(&mut self) -> AlgorithmResult<()>;

    /// The `count` most informative unlabeled candidate links.
    fn next_examples(&mut self, count: usize) -> AlgorithmResult<Mapping>;

    /// Learn from labeled examples (1.0 positive, 0.0 negative).
    fn learn_from_feedback(&mut self, labeled: &Mapping) -> AlgorithmResult<LearnedModel>;
}

/// Learns without labels by optimising a pseudo measure.
pub trait UnsupervisedLearner: LinkLearner {
    fn learn(&mut self, measure: &dyn PseudoMeasure) -> AlgorithmResult<LearnedModel>;
}

/// A learner in one of its three training modes.
pub enum Learner {
    SupervisedBatch(Box<dyn SupervisedLearner>),
    SupervisedActive(Box<dyn ActiveLearner>),
    Unsupervised(Box<dyn UnsupervisedLearner>),
}

impl Learner {
    pub fn implementation_type(&self) -> ImplementationType {
        match self {
            Learner::SupervisedBatch(_) => ImplementationType::SupervisedBatch,
            Learner::SupervisedActive(_) => ImplementationType::SupervisedActive,
            Learner::Unsupervised(_) => ImplementationType::Unsupervised,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Learner::SupervisedBatch(l) => l.name(),
            Learner::SupervisedActive(l) => l.name(),
            Learner::Unsupervised(l) => l.name(),
        }
    }

    pub fn init(
        &mut self,
        parameters: &[LearningParameter],
        source: Arc<dyn Cache>,
        target: Arc<dyn Cache>,
    ) -> AlgorithmResult<()> {
        match self {
            Learner::SupervisedBatch(l) => l.init(parameters, source, target),
            Learner::SupervisedActive(l) => l.init(parameters, source, target),
            Learner::Unsupervised(l) => l.init(parameters, source, target),
        }
    }

    pub fn set_configuration(&mut self, configuration: &LinkConfiguration) {
        match self {
            Learner::SupervisedBatch(l) => l.set_configuration(configuration),
            Learner::SupervisedActive(l) => l.set_configuration(configuration),
            Learner::Unsupervised(l) => l.set_configuration(configuration),
        }
    }

    pub fn predict(
        &self,
        source: &dyn Cache,
        target: &dyn Cache,
        model: &LearnedModel,
    ) -> AlgorithmResult<Mapping> {
        match self {
            Learner::SupervisedBatch(l) => l.predict(source, target, model),
            Learner::SupervisedActive(l) => l.predict(source, target, model),
            Learner::Unsupervised(l) => l.predict(source, target, model),
        }
    }
}

/// Builds fresh learners, one per run.
pub trait AlgorithmFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Parameters the algorithm understands, with their defaults.
    fn default_parameters(&self) -> Vec<LearningParameter> {
        Vec::new()
    }

    /// Build a learner for `kind`, or fail if the algorithm lacks that mode.
    fn create(&self, kind: ImplementationType) -> AlgorithmResult<Learner>;
}

/// An algorithm as scheduled by an experiment.
#[derive(Clone)]
pub struct TaskAlgorithm {
    /// Display name, unique within an experiment.
    pub name: String,
    /// Implementation type as declared; parsed at dispatch time.
    pub declared_type: String,
    pub factory: Arc<dyn AlgorithmFactory>,
    /// Fixed parameters used when no grid is given.
    pub parameters: Vec<LearningParameter>,
    /// Candidate values to tune over.
    pub parameter_space: Option<Vec<ParameterCandidates>>,
}

impl TaskAlgorithm {
    pub fn new(
        name: impl Into<String>,
        kind: ImplementationType,
        factory: Arc<dyn AlgorithmFactory>,
    ) -> Self {
        Self::declared(name, kind.to_string(), factory)
    }

    /// A task whose implementation type is only validated when it runs.
    pub fn declared(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        factory: Arc<dyn AlgorithmFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            factory,
            parameters: Vec::new(),
            parameter_space: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<LearningParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_parameter_space(mut self, space: Vec<ParameterCandidates>) -> Self {
        self.parameter_space = Some(space);
        self
    }

    pub fn implementation_type(&self) -> AlgorithmResult<ImplementationType> {
        self.declared_type
            .parse()
            .map_err(|kind| AlgorithmError::UnsupportedImplementation {
                algorithm: self.name.clone(),
                kind,
            })
    }

    /// Build a fresh learner for the declared implementation type.
    pub fn learner(&self) -> AlgorithmResult<Learner> {
        let kind = self.implementation_type()?;
        let learner = self.factory.create(kind)?;
        if learner.implementation_type() != kind {
            return Err(AlgorithmError::UnsupportedImplementation {
                algorithm: self.name.clone(),
                kind: kind.to_string(),
            });
        }
        Ok(learner)
    }
}

impl fmt::Debug for TaskAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskAlgorithm")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("factory", &self.factory.name())
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

/// Everything a training call needs besides the learner and its data.
pub struct TrainingContext<'a> {
    pub configuration: &'a LinkConfiguration,
    pub pseudo_measure: &'a dyn PseudoMeasure,
    /// Oracle for active learners; a simulated oracle over the training
    /// mapping is used when absent.
    pub oracle: Option<&'a dyn Oracle>,
}

/// Initialise `learner` on `training` and learn a model in its mode.
///
/// Active learners run exactly one oracle round, asking for half as many
/// examples as the training mapping holds links.
pub fn train(
    learner: &mut Learner,
    parameters: &[LearningParameter],
    training: &FoldData,
    context: &TrainingContext<'_>,
) -> AlgorithmResult<LearnedModel> {
    learner.init(parameters, training.source.clone(), training.target.clone())?;
    learner.set_configuration(context.configuration);

    match learner {
        Learner::SupervisedBatch(l) => l.learn(&training.mapping),
        Learner::SupervisedActive(l) => {
            l.bootstrap()?;
            let count = (0.5 * training.mapping.size() as f64).round() as usize;
            let examples = l.next_examples(count)?;
            let labeled = match context.oracle {
                Some(oracle) => oracle.classify(&examples)?,
                None => SimulatedOracle::new(training.mapping.clone()).classify(&examples)?,
            };
            tracing::debug!(
                algorithm = l.name(),
                requested = count,
                labeled = labeled.size(),
                "active learning round complete"
            );
            l.learn_from_feedback(&labeled)
        }
        Learner::Unsupervised(l) => l.learn(context.pseudo_measure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::algorithm::threshold::ThresholdFactory;
    use crate::cache::{Instance, MemoryCache};
    use crate::measure::pseudo::PseudoFMeasure;

    /// Records every active-learning call it receives.
    struct RecordingLearner {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl LinkLearner for RecordingLearner {
        fn name(&self) -> &str {
            "recording"
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

    impl ActiveLearner for RecordingLearner {
        fn bootstrap(&mut self) -> AlgorithmResult<()> {
            self.calls.lock().unwrap().push("bootstrap".into());
            Ok(())
        }

        fn next_examples(&mut self, count: usize) -> AlgorithmResult<Mapping> {
            self.calls.lock().unwrap().push(format!("next_examples({count})"));
            Ok(Mapping::from_links([("s1", "t1", 0.9), ("s2", "t1", 0.4)]))
        }

        fn learn_from_feedback(&mut self, labeled: &Mapping) -> AlgorithmResult<LearnedModel> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("learn_from_feedback({})", labeled.positive_count()));
            Ok(LearnedModel {
                link_spec: LinkSpec::atomic("recording", "*", 0.5),
                quality: 1.0,
            })
        }
    }

    #[test]
    fn active_training_runs_one_round_of_half_the_training_size() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut learner = Learner::SupervisedActive(Box::new(RecordingLearner {
            calls: Arc::clone(&calls),
        }));
        let source: MemoryCache = (1..=7).map(|i| Instance::new(format!("s{i}"))).collect();
        let target: MemoryCache = (1..=7).map(|i| Instance::new(format!("t{i}"))).collect();
        let mapping = Mapping::from_links((1..=7).map(|i| (format!("s{i}"), format!("t{i}"), 1.0)));
        let training = FoldData::new(mapping, source, target);
        let configuration = LinkConfiguration::default();
        let pseudo = PseudoFMeasure::default();
        let context = TrainingContext {
            configuration: &configuration,
            pseudo_measure: &pseudo,
            oracle: None,
        };

        train(&mut learner, &[], &training, &context).unwrap();

        // round(0.5 * 7) = 4; only s1-t1 is a training positive.
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["bootstrap", "next_examples(4)", "learn_from_feedback(1)"]
        );
    }

    #[test]
    fn implementation_types_parse() {
        assert_eq!(
            "supervised_batch".parse::<ImplementationType>(),
            Ok(ImplementationType::SupervisedBatch)
        );
        assert_eq!(
            "Supervised-Active".parse::<ImplementationType>(),
            Ok(ImplementationType::SupervisedActive)
        );
        assert!("semi_supervised".parse::<ImplementationType>().is_err());
    }

    #[test]
    fn unknown_declared_type_is_a_configuration_error() {
        let task = TaskAlgorithm::declared("t", "reinforcement", Arc::new(ThresholdFactory));
        assert!(matches!(
            task.learner(),
            Err(AlgorithmError::UnsupportedImplementation { .. })
        ));
    }

    #[test]
    fn learner_matches_declared_type() {
        for kind in [
            ImplementationType::SupervisedBatch,
            ImplementationType::SupervisedActive,
            ImplementationType::Unsupervised,
        ] {
            let task = TaskAlgorithm::new("t", kind, Arc::new(ThresholdFactory));
            assert_eq!(task.learner().unwrap().implementation_type(), kind);
        }
    }
}
