//! Experiment configuration, persisted as TOML.
//!
//! An experiment names its datasets, the algorithms to compare with their
//! fixed parameters and tuning grids, and the evaluation settings.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::algorithm::TaskAlgorithm;
use crate::algorithm::registry::AlgorithmRegistry;
use crate::dataset::{DatasetLoader, EvaluationData, JsonDatasetLoader};
use crate::error::{ConfigError, EvalError, EvalResult};
use crate::evaluator::EvaluatorConfig;
use crate::fold::DEFAULT_MAX_NEGATIVE_DRAWS;
use crate::measure::MeasureType;
use crate::tuning::DEFAULT_TUNE_SPLIT;
use crate::tuning::parameter::{LearningParameter, ParamKind, ParamValue, ParameterCandidates};

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Which oracle answers active learners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    /// Look labels up in the training fold.
    #[default]
    Simulated,
    /// Ask on the terminal.
    Console,
}

/// The `[evaluation]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSettings {
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Negatives in cross-validation training folds; tuned runs never use them.
    #[serde(default = "default_true")]
    pub with_negative_examples: bool,
    /// Worker threads, 0 for one per core.
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_measures")]
    pub measures: Vec<MeasureType>,
    #[serde(default = "default_tune_split")]
    pub tune_split: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_max_negative_draws")]
    pub max_negative_draws: usize,
    #[serde(default)]
    pub oracle: OracleKind,
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,
    #[serde(default = "default_oracle_max_rounds")]
    pub oracle_max_rounds: usize,
}

fn default_folds() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_measures() -> Vec<MeasureType> {
    MeasureType::ALL.to_vec()
}
fn default_tune_split() -> f64 {
    DEFAULT_TUNE_SPLIT
}
fn default_beta() -> f64 {
    1.0
}
fn default_max_negative_draws() -> usize {
    DEFAULT_MAX_NEGATIVE_DRAWS
}
fn default_oracle_timeout_secs() -> u64 {
    300
}
fn default_oracle_max_rounds() -> usize {
    10
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            folds: default_folds(),
            seed: None,
            with_negative_examples: true,
            threads: 0,
            measures: default_measures(),
            tune_split: default_tune_split(),
            beta: default_beta(),
            max_negative_draws: default_max_negative_draws(),
            oracle: OracleKind::default(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            oracle_max_rounds: default_oracle_max_rounds(),
        }
    }
}

/// A `[[datasets]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub name: String,
    /// JSON dataset file, relative to the experiment file.
    pub path: PathBuf,
}

/// An `[[algorithms]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmEntry {
    /// Display name, unique within the experiment.
    pub name: String,
    /// Registered implementation name.
    pub implementation: String,
    /// Implementation type; checked when the algorithm runs.
    pub kind: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
    /// Candidate values per parameter.
    #[serde(default)]
    pub grid: BTreeMap<String, Vec<ParamValue>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub evaluation: EvaluationSettings,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
    #[serde(default)]
    pub algorithms: Vec<AlgorithmEntry>,
}

impl ExperimentConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let e = &self.evaluation;
        if e.folds < 2 {
            return Err(invalid(format!("folds must be at least 2, got {}", e.folds)));
        }
        if e.tune_split < 1.0 {
            return Err(invalid(format!("tune_split must be at least 1, got {}", e.tune_split)));
        }
        if e.beta <= 0.0 {
            return Err(invalid(format!("beta must be positive, got {}", e.beta)));
        }
        let mut names = BTreeSet::new();
        for algorithm in &self.algorithms {
            if !names.insert(algorithm.name.as_str()) {
                return Err(invalid(format!("algorithm name \"{}\" is used twice", algorithm.name)));
            }
        }
        let mut datasets = BTreeSet::new();
        for dataset in &self.datasets {
            if !datasets.insert(dataset.name.as_str()) {
                return Err(invalid(format!("dataset name \"{}\" is used twice", dataset.name)));
            }
        }
        Ok(())
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        let e = &self.evaluation;
        EvaluatorConfig {
            folds: e.folds,
            seed: e.seed,
            with_negative_examples: e.with_negative_examples,
            threads: e.threads,
            measures: e.measures.clone(),
            tune_split: e.tune_split,
            beta: e.beta,
            max_negative_draws: e.max_negative_draws,
        }
    }

    /// Resolve every algorithm entry against `registry`.
    pub fn tasks(&self, registry: &AlgorithmRegistry) -> EvalResult<Vec<TaskAlgorithm>> {
        self.algorithms
            .iter()
            .map(|entry| entry.to_task(registry))
            .collect()
    }

    /// Load every dataset; relative paths resolve against `base_dir`.
    pub fn load_datasets(&self, base_dir: &Path) -> EvalResult<Vec<EvaluationData>> {
        let mut loader = JsonDatasetLoader::new();
        for entry in &self.datasets {
            loader.register(entry.name.clone(), base_dir.join(&entry.path));
        }
        self.datasets
            .iter()
            .map(|entry| loader.load(&entry.name).map_err(EvalError::from))
            .collect()
    }
}

impl AlgorithmEntry {
    pub fn to_task(&self, registry: &AlgorithmRegistry) -> EvalResult<TaskAlgorithm> {
        let factory = registry.get(&self.implementation)?;
        let defaults = factory.default_parameters();
        let declared = |name: &str, value: &ParamValue| {
            defaults
                .iter()
                .find(|p| p.name == name)
                .cloned()
                .unwrap_or_else(|| undeclared(name, value))
        };

        let mut parameters = defaults.clone();
        for (name, value) in &self.parameters {
            let parameter = declared(name, value).with_value(value.clone());
            parameter.validate()?;
            match parameters.iter_mut().find(|p| p.name == *name) {
                Some(existing) => *existing = parameter,
                None => parameters.push(parameter),
            }
        }

        let mut space = Vec::with_capacity(self.grid.len());
        for (name, candidates) in &self.grid {
            let Some(first) = candidates.first() else {
                return Err(invalid(format!(
                    "grid for \"{name}\" in algorithm \"{}\" has no candidates",
                    self.name
                ))
                .into());
            };
            let representative = declared(name, first);
            for value in candidates {
                representative.with_value(value.clone()).validate()?;
            }
            space.push(ParameterCandidates::new(representative, candidates.clone()));
        }

        let task = TaskAlgorithm::declared(self.name.clone(), self.kind.clone(), factory)
            .with_parameters(parameters);
        Ok(if space.is_empty() {
            task
        } else {
            task.with_parameter_space(space)
        })
    }
}

/// A parameter the algorithm does not declare, typed from its value.
fn undeclared(name: &str, value: &ParamValue) -> LearningParameter {
    let kind = match value {
        ParamValue::Bool(_) => ParamKind::Bool,
        ParamValue::Int(_) => ParamKind::Int,
        ParamValue::Float(_) => ParamKind::Float,
        ParamValue::Text(_) => ParamKind::Text,
        ParamValue::List(_) => ParamKind::TextSet,
    };
    LearningParameter::new(
        name,
        value.clone(),
        kind,
        f64::NEG_INFINITY,
        f64::INFINITY,
        0.0,
    )
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}
