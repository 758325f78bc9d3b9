//! Evaluation datasets: caches, reference mapping and learner configuration.
//!
//! Loading from RDF endpoints is left to external loaders implementing
//! [`DatasetLoader`]; [`JsonDatasetLoader`] reads self-contained JSON files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{Cache, Instance, MemoryCache};
use crate::error::DatasetError;
use crate::mapping::{GoldStandard, Mapping};

pub type DatasetResult<T> = std::result::Result<T, DatasetError>;

/// Key-value settings handed to learners via `set_configuration`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkConfiguration {
    entries: BTreeMap<String, String>,
}

impl LinkConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// One dataset as consumed by the evaluator.
#[derive(Debug, Clone)]
pub struct EvaluationData {
    pub name: String,
    pub source: Arc<MemoryCache>,
    pub target: Arc<MemoryCache>,
    pub reference: Mapping,
    /// Training links for evaluation without folds; the reference when absent.
    pub training: Option<Mapping>,
    pub configuration: LinkConfiguration,
    /// Source property → target property correspondences.
    pub property_mapping: BTreeMap<String, String>,
}

impl EvaluationData {
    pub fn new(
        name: impl Into<String>,
        source: MemoryCache,
        target: MemoryCache,
        reference: Mapping,
    ) -> Self {
        Self {
            name: name.into(),
            source: Arc::new(source),
            target: Arc::new(target),
            reference,
            training: None,
            configuration: LinkConfiguration::default(),
            property_mapping: BTreeMap::new(),
        }
    }

    pub fn with_training(mut self, training: Mapping) -> Self {
        self.training = Some(training);
        self
    }

    pub fn with_configuration(mut self, configuration: LinkConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    /// The reference mapping over the full cache universe.
    pub fn gold_standard(&self) -> GoldStandard {
        GoldStandard::new(
            self.reference.clone(),
            self.source.all_uris(),
            self.target.all_uris(),
        )
    }

    pub fn training_mapping(&self) -> &Mapping {
        self.training.as_ref().unwrap_or(&self.reference)
    }
}

/// Supplies datasets by name.
pub trait DatasetLoader: Send + Sync {
    fn load(&self, name: &str) -> DatasetResult<EvaluationData>;
}

/// A reference link as stored in dataset files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub source: String,
    pub target: String,
    #[serde(default = "default_score")]
    pub score: f64,
}

fn default_score() -> f64 {
    1.0
}

/// On-disk dataset layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub name: String,
    pub source: Vec<Instance>,
    pub target: Vec<Instance>,
    pub reference: Vec<LinkRecord>,
    #[serde(default)]
    pub training: Option<Vec<LinkRecord>>,
    #[serde(default)]
    pub configuration: LinkConfiguration,
    #[serde(default)]
    pub property_mapping: BTreeMap<String, String>,
}

fn to_mapping(records: &[LinkRecord], path: &Path) -> DatasetResult<Mapping> {
    let mut mapping = Mapping::new();
    for r in records {
        mapping
            .try_add(r.source.clone(), r.target.clone(), r.score)
            .map_err(|e| DatasetError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
    }
    Ok(mapping)
}

impl DatasetFile {
    pub fn read(path: &Path) -> DatasetResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DatasetError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| DatasetError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn into_evaluation_data(self, path: &Path) -> DatasetResult<EvaluationData> {
        let reference = to_mapping(&self.reference, path)?;
        let training = self
            .training
            .as_deref()
            .map(|records| to_mapping(records, path))
            .transpose()?;
        Ok(EvaluationData {
            name: self.name,
            source: Arc::new(self.source.into_iter().collect()),
            target: Arc::new(self.target.into_iter().collect()),
            reference,
            training,
            configuration: self.configuration,
            property_mapping: self.property_mapping,
        })
    }
}

/// Loads datasets from JSON files, by registered name or by path.
#[derive(Debug, Clone, Default)]
pub struct JsonDatasetLoader {
    paths: BTreeMap<String, PathBuf>,
}

impl JsonDatasetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(name.into(), path.into());
    }

    pub fn load_path(&self, path: &Path) -> DatasetResult<EvaluationData> {
        let data = DatasetFile::read(path)?.into_evaluation_data(path)?;
        tracing::info!(
            dataset = %data.name,
            sources = data.source.len(),
            targets = data.target.len(),
            links = data.reference.size(),
            "loaded dataset"
        );
        Ok(data)
    }
}

impl DatasetLoader for JsonDatasetLoader {
    fn load(&self, name: &str) -> DatasetResult<EvaluationData> {
        let path = self.paths.get(name).ok_or_else(|| DatasetError::Unknown {
            name: name.to_string(),
        })?;
        let mut data = self.load_path(path)?;
        data.name = name.to_string();
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "toy",
        "source": [{"uri": "s1", "properties": {"name": ["Alpha"]}}],
        "target": [{"uri": "t1", "properties": {"label": ["alpha"]}}],
        "reference": [{"source": "s1", "target": "t1"}],
        "configuration": {"property": "name"}
    }"#;

    #[test]
    fn json_dataset_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut loader = JsonDatasetLoader::new();
        loader.register("restaurants", &path);
        let data = loader.load("restaurants").unwrap();

        assert_eq!(data.name, "restaurants");
        assert_eq!(data.reference.score("s1", "t1"), Some(1.0));
        assert_eq!(data.configuration.get("property"), Some("name"));
        assert!(data.source.contains_uri("s1"));
        assert_eq!(data.training_mapping(), &data.reference);
    }

    #[test]
    fn unknown_dataset_fails() {
        let loader = JsonDatasetLoader::new();
        assert!(matches!(
            loader.load("nope"),
            Err(DatasetError::Unknown { .. })
        ));
    }

    #[test]
    fn invalid_scores_are_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            SAMPLE.replace(r#""target": "t1"}"#, r#""target": "t1", "score": 3.0}"#),
        )
        .unwrap();
        assert!(matches!(
            JsonDatasetLoader::new().load_path(&path),
            Err(DatasetError::Parse { .. })
        ));
    }
}
