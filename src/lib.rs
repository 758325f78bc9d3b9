// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # linkeval
//!
//! Cross-validation, hyperparameter tuning and statistical comparison of
//! link-discovery learners.
//!
//! ## Architecture
//!
//! - **Mappings** (`mapping`): weighted source → target link relations and gold standards
//! - **Folds** (`fold`): disjoint k-fold partitions with negative sampling and cache repair
//! - **Tuning** (`tuning`): parameter grids and an inner train/validate search
//! - **Algorithms** (`algorithm`): the three-mode learner contract and a built-in learner
//! - **Scoring** (`measure`, `stats`): precision/recall/F/accuracy and McNemar's test
//! - **Orchestration** (`evaluator`): parallel runs collected into a [`run::Summary`]
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use linkeval::algorithm::TaskAlgorithm;
//! use linkeval::algorithm::threshold::{ThresholdFactory, default_parameters};
//! use linkeval::algorithm::ImplementationType;
//! use linkeval::dataset::{DatasetLoader, JsonDatasetLoader};
//! use linkeval::evaluator::{Evaluator, EvaluatorConfig};
//!
//! let mut loader = JsonDatasetLoader::new();
//! loader.register("persons", "persons.json");
//! let data = loader.load("persons").unwrap();
//!
//! let task = TaskAlgorithm::new("jaccard", ImplementationType::SupervisedBatch, Arc::new(ThresholdFactory))
//!     .with_parameters(default_parameters());
//! let summary = Evaluator::new(EvaluatorConfig::default())
//!     .cross_validate_with_tuning_and_statistical_test(&[task], &[data])
//!     .unwrap();
//! println!("{}", summary.to_json().unwrap());
//! ```

pub mod algorithm;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluator;
pub mod fold;
pub mod mapping;
pub mod measure;
pub mod oracle;
pub mod run;
pub mod stats;
pub mod tuning;
