//! Token-Jaccard threshold learner.
//!
//! Links a source and a target instance when the Jaccard similarity of their
//! property-value tokens reaches a learned threshold. It supports all three
//! training modes and serves as the built-in reference algorithm.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::algorithm::{
    ActiveLearner, AlgorithmFactory, AlgorithmResult, ImplementationType, LearnedModel, Learner,
    LinkLearner, LinkSpec, SupervisedLearner, UnsupervisedLearner,
};
use crate::cache::{Cache, Instance};
use crate::dataset::LinkConfiguration;
use crate::error::AlgorithmError;
use crate::mapping::{Mapping, POSITIVE_THRESHOLD};
use crate::measure::f_beta;
use crate::measure::pseudo::PseudoMeasure;
use crate::tuning::parameter::{LearningParameter, ParamKind, ParamValue, find};

pub const NAME: &str = "threshold";

pub const PARAM_PROPERTY: &str = "property";
pub const PARAM_MIN_THRESHOLD: &str = "min_threshold";
pub const PARAM_STEP: &str = "step";

/// Default parameters of the threshold learner.
pub fn default_parameters() -> Vec<LearningParameter> {
    vec![
        LearningParameter::text(PARAM_PROPERTY, "")
            .with_description("property compared on both sides, empty for all properties"),
        LearningParameter::float(PARAM_MIN_THRESHOLD, 0.3, 0.0, 1.0, 0.05)
            .with_description("lowest similarity threshold considered"),
        LearningParameter::float(PARAM_STEP, 0.05, 0.001, 1.0, 0.001)
            .with_description("distance between candidate thresholds"),
    ]
}

/// Builds [`ThresholdLearner`]s for any implementation type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdFactory;

impl AlgorithmFactory for ThresholdFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn default_parameters(&self) -> Vec<LearningParameter> {
        default_parameters()
    }

    fn create(&self, kind: ImplementationType) -> AlgorithmResult<Learner> {
        let learner = Box::new(ThresholdLearner::new());
        Ok(match kind {
            ImplementationType::SupervisedBatch => Learner::SupervisedBatch(learner),
            ImplementationType::SupervisedActive => Learner::SupervisedActive(learner),
            ImplementationType::Unsupervised => Learner::Unsupervised(learner),
        })
    }
}

pub struct ThresholdLearner {
    property: Option<String>,
    min_threshold: f64,
    step: f64,
    source: Option<Arc<dyn Cache>>,
    target: Option<Arc<dyn Cache>>,
    /// Scored candidate links for active learning.
    candidates: Vec<(String, String, f64)>,
    current_threshold: f64,
}

impl Default for ThresholdLearner {
    fn default() -> Self {
        Self::new()
    }
}

impl ThresholdLearner {
    pub fn new() -> Self {
        Self {
            property: None,
            min_threshold: 0.3,
            step: 0.05,
            source: None,
            target: None,
            candidates: Vec::new(),
            current_threshold: 0.65,
        }
    }

    fn caches(&self) -> AlgorithmResult<(&dyn Cache, &dyn Cache)> {
        match (&self.source, &self.target) {
            (Some(s), Some(t)) => Ok((s.as_ref(), t.as_ref())),
            _ => Err(AlgorithmError::NotInitialized {
                algorithm: NAME.to_string(),
            }),
        }
    }

    fn tokens(&self, instance: &Instance) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();
        let mut push = |value: &str| {
            for token in value.split(|c: char| !c.is_alphanumeric()) {
                if !token.is_empty() {
                    tokens.insert(token.to_lowercase());
                }
            }
        };
        match &self.property {
            Some(p) => instance.values(p).for_each(&mut push),
            None => instance.all_values().for_each(&mut push),
        }
        tokens
    }

    /// Jaccard similarity of the two instances' token sets.
    pub fn similarity(&self, source: &Instance, target: &Instance) -> f64 {
        let a = self.tokens(source);
        let b = self.tokens(target);
        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(&b).count() as f64 / union as f64
    }

    fn pair_similarity(&self, source: &dyn Cache, target: &dyn Cache, s: &str, t: &str) -> f64 {
        match (source.instance(s), target.instance(t)) {
            (Some(a), Some(b)) => self.similarity(a, b),
            _ => 0.0,
        }
    }

    fn thresholds(&self) -> Vec<f64> {
        let mut result = Vec::new();
        let mut t = self.min_threshold;
        while t <= 1.0 + 1e-9 {
            result.push(t.min(1.0));
            t += self.step;
        }
        result
    }

    fn link_all(&self, source: &dyn Cache, target: &dyn Cache, threshold: f64) -> Mapping {
        let mut result = Mapping::new();
        for s in source.instances() {
            for t in target.instances() {
                let sim = self.similarity(s, t);
                if sim > 0.0 && sim >= threshold {
                    result.add(s.uri.clone(), t.uri.clone(), sim);
                }
            }
        }
        result
    }

    fn no_thresholds(&self) -> AlgorithmError {
        AlgorithmError::LearnFailed {
            algorithm: NAME.to_string(),
            message: format!("no candidate threshold in [{}, 1]", self.min_threshold),
        }
    }

    fn model(&self, threshold: f64, quality: f64) -> LearnedModel {
        let property = self.property.as_deref().unwrap_or("*");
        LearnedModel {
            link_spec: LinkSpec::atomic("jaccard", property, threshold),
            quality,
        }
    }

    /// Pick the threshold with the best F1 over labeled links.
    fn fit(&self, labeled: &Mapping) -> AlgorithmResult<LearnedModel> {
        let (source, target) = self.caches()?;
        let scored: Vec<(f64, bool)> = labeled
            .pairs()
            .map(|(s, t, label)| {
                (
                    self.pair_similarity(source, target, s, t),
                    label >= POSITIVE_THRESHOLD,
                )
            })
            .collect();
        let positives = scored.iter().filter(|(_, p)| *p).count();

        let mut best: Option<(f64, f64)> = None;
        for threshold in self.thresholds() {
            let predicted: Vec<bool> = scored.iter().map(|(sim, _)| *sim >= threshold).collect();
            let tp = scored
                .iter()
                .zip(&predicted)
                .filter(|((_, p), hit)| *p && **hit)
                .count();
            let predicted_count = predicted.iter().filter(|hit| **hit).count();
            let precision = if predicted_count == 0 {
                0.0
            } else {
                tp as f64 / predicted_count as f64
            };
            let recall = if positives == 0 {
                0.0
            } else {
                tp as f64 / positives as f64
            };
            let f = f_beta(precision, recall, 1.0);
            if best.is_none_or(|(_, best_f)| f > best_f) {
                best = Some((threshold, f));
            }
        }

        let (threshold, quality) = best.ok_or_else(|| self.no_thresholds())?;
        Ok(self.model(threshold, quality))
    }
}

fn read_float(parameters: &[LearningParameter], name: &str, default: f64) -> AlgorithmResult<f64> {
    match find(parameters, name) {
        None => Ok(default),
        Some(p) => {
            p.validate()?;
            p.value
                .as_f64()
                .ok_or_else(|| AlgorithmError::InvalidParameter {
                    name: name.to_string(),
                    message: format!("expected a number, got {}", p.value),
                })
        }
    }
}

impl LinkLearner for ThresholdLearner {
    fn name(&self) -> &str {
        NAME
    }

    fn init(
        &mut self,
        parameters: &[LearningParameter],
        source: Arc<dyn Cache>,
        target: Arc<dyn Cache>,
    ) -> AlgorithmResult<()> {
        self.min_threshold = read_float(parameters, PARAM_MIN_THRESHOLD, 0.3)?;
        self.step = read_float(parameters, PARAM_STEP, 0.05)?;
        if self.step <= 0.0 {
            return Err(AlgorithmError::InvalidParameter {
                name: PARAM_STEP.to_string(),
                message: "step must be positive".into(),
            });
        }
        self.property = match find(parameters, PARAM_PROPERTY).map(|p| &p.value) {
            Some(ParamValue::Text(p)) if !p.is_empty() => Some(p.clone()),
            Some(ParamValue::Text(_)) | None => None,
            Some(other) => {
                return Err(AlgorithmError::InvalidParameter {
                    name: PARAM_PROPERTY.to_string(),
                    message: format!("expected {:?}, got {other}", ParamKind::Text),
                });
            }
        };
        self.source = Some(source);
        self.target = Some(target);
        self.candidates.clear();
        self.current_threshold = (self.min_threshold + 1.0) / 2.0;
        Ok(())
    }

    fn set_configuration(&mut self, configuration: &LinkConfiguration) {
        if self.property.is_none() {
            self.property = configuration.get(PARAM_PROPERTY).map(str::to_string);
        }
    }

    fn predict(
        &self,
        source: &dyn Cache,
        target: &dyn Cache,
        model: &LearnedModel,
    ) -> AlgorithmResult<Mapping> {
        let threshold = model.link_spec.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AlgorithmError::PredictFailed {
                algorithm: NAME.to_string(),
                message: format!("threshold {threshold} of model {} is outside [0, 1]", model.link_spec),
            });
        }
        Ok(self.link_all(source, target, threshold))
    }
}

impl SupervisedLearner for ThresholdLearner {
    fn learn(&mut self, training: &Mapping) -> AlgorithmResult<LearnedModel> {
        self.fit(training)
    }
}

impl ActiveLearner for ThresholdLearner {
    fn bootstrap(&mut self) -> AlgorithmResult<()> {
        let (source, target) = self.caches()?;
        let mut candidates = Vec::new();
        for s in source.instances() {
            for t in target.instances() {
                let sim = self.similarity(s, t);
                if sim > 0.0 {
                    candidates.push((s.uri.clone(), t.uri.clone(), sim));
                }
            }
        }
        self.candidates = candidates;
        Ok(())
    }

    fn next_examples(&mut self, count: usize) -> AlgorithmResult<Mapping> {
        let current = self.current_threshold;
        let mut ranked: Vec<&(String, String, f64)> = self.candidates.iter().collect();
        ranked.sort_by(|a, b| {
            (a.2 - current)
                .abs()
                .total_cmp(&(b.2 - current).abs())
                .then_with(|| (&a.0, &a.1).cmp(&(&b.0, &b.1)))
        });
        Ok(Mapping::from_links(
            ranked
                .into_iter()
                .take(count)
                .map(|(s, t, sim)| (s.clone(), t.clone(), *sim)),
        ))
    }

    fn learn_from_feedback(&mut self, labeled: &Mapping) -> AlgorithmResult<LearnedModel> {
        let model = self.fit(labeled)?;
        self.current_threshold = model.link_spec.threshold;
        self.candidates
            .retain(|(s, t, _)| !labeled.contains(s, t));
        Ok(model)
    }
}

impl UnsupervisedLearner for ThresholdLearner {
    fn learn(&mut self, measure: &dyn PseudoMeasure) -> AlgorithmResult<LearnedModel> {
        let (source, target) = self.caches()?;
        let mut best: Option<(f64, f64)> = None;
        for threshold in self.thresholds() {
            let predictions = self.link_all(source, target, threshold);
            let score = measure.calculate(&predictions, source, target);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((threshold, score));
            }
        }
        let (threshold, quality) = best.ok_or_else(|| self.no_thresholds())?;
        Ok(self.model(threshold, quality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::measure::pseudo::PseudoFMeasure;

    fn caches() -> (Arc<MemoryCache>, Arc<MemoryCache>) {
        let source: MemoryCache = [
            Instance::new("s1").with_property("name", "Blue Fin Cafe"),
            Instance::new("s2").with_property("name", "Golden Dragon Palace"),
            Instance::new("s3").with_property("name", "Casa Roma"),
        ]
        .into_iter()
        .collect();
        let target: MemoryCache = [
            Instance::new("t1").with_property("label", "blue fin cafe"),
            Instance::new("t2").with_property("label", "golden dragon"),
            Instance::new("t3").with_property("label", "roma pizza casa"),
        ]
        .into_iter()
        .collect();
        (Arc::new(source), Arc::new(target))
    }

    fn initialised() -> ThresholdLearner {
        let (s, t) = caches();
        let mut learner = ThresholdLearner::new();
        learner.init(&default_parameters(), s, t).unwrap();
        learner
    }

    #[test]
    fn similarity_is_token_jaccard() {
        let learner = ThresholdLearner::new();
        let a = Instance::new("a").with_property("n", "Blue Fin Cafe");
        let b = Instance::new("b").with_property("n", "blue fin");
        assert!((learner.similarity(&a, &b) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn supervised_learning_recovers_gold() {
        let mut learner = initialised();
        let training = Mapping::from_links([
            ("s1", "t1", 1.0),
            ("s2", "t2", 1.0),
            ("s3", "t3", 1.0),
            ("s1", "t2", 0.0),
        ]);
        let model = SupervisedLearner::learn(&mut learner, &training).unwrap();
        let (s, t) = caches();
        let predictions = learner.predict(s.as_ref(), t.as_ref(), &model).unwrap();
        assert!(predictions.contains("s1", "t1"));
        assert!(predictions.contains("s2", "t2"));
        assert!(predictions.contains("s3", "t3"));
        assert!(!predictions.contains("s1", "t2"));
        assert_eq!(model.complexity(), 1);
    }

    #[test]
    fn active_examples_are_closest_to_threshold() {
        let mut learner = initialised();
        learner.bootstrap().unwrap();
        let examples = learner.next_examples(2).unwrap();
        assert_eq!(examples.size(), 2);

        let labeled = Mapping::from_links(examples.pairs().map(|(s, t, _)| {
            let label = if s[1..] == t[1..] { 1.0 } else { 0.0 };
            (s.to_string(), t.to_string(), label)
        }));
        let model = learner.learn_from_feedback(&labeled).unwrap();
        assert!(model.link_spec.threshold >= 0.3);
    }

    #[test]
    fn unsupervised_learning_prefers_one_to_one() {
        let mut learner = initialised();
        let model = UnsupervisedLearner::learn(&mut learner, &PseudoFMeasure::default()).unwrap();
        let (s, t) = caches();
        let predictions = learner.predict(s.as_ref(), t.as_ref(), &model).unwrap();
        assert!(predictions.contains("s1", "t1"));
        assert!(model.quality > 0.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let (s, t) = caches();
        let mut learner = ThresholdLearner::new();
        let params = vec![LearningParameter::float(PARAM_MIN_THRESHOLD, 2.0, 0.0, 1.0, 0.05)];
        assert!(learner.init(&params, s, t).is_err());
    }

    #[test]
    fn empty_threshold_range_fails_to_learn() {
        let (s, t) = caches();
        let mut learner = ThresholdLearner::new();
        let params = vec![LearningParameter::float(PARAM_MIN_THRESHOLD, 1.5, 0.0, 2.0, 0.05)];
        learner.init(&params, s, t).unwrap();
        assert!(matches!(
            SupervisedLearner::learn(&mut learner, &Mapping::from_links([("s1", "t1", 1.0)])),
            Err(AlgorithmError::LearnFailed { .. })
        ));
        assert!(matches!(
            UnsupervisedLearner::learn(&mut learner, &PseudoFMeasure::default()),
            Err(AlgorithmError::LearnFailed { .. })
        ));
    }

    #[test]
    fn out_of_range_model_fails_to_predict() {
        let learner = initialised();
        let model = LearnedModel {
            link_spec: LinkSpec::atomic("jaccard", "*", 1.5),
            quality: 0.0,
        };
        let (s, t) = caches();
        assert!(matches!(
            learner.predict(s.as_ref(), t.as_ref(), &model),
            Err(AlgorithmError::PredictFailed { .. })
        ));
    }

    #[test]
    fn learning_before_init_fails() {
        let mut learner = ThresholdLearner::new();
        assert!(matches!(
            SupervisedLearner::learn(&mut learner, &Mapping::new()),
            Err(AlgorithmError::NotInitialized { .. })
        ));
    }
}
