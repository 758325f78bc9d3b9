//! Rich diagnostic error types for the linkeval engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so users know what went wrong with a
//! dataset, an algorithm or an experiment file and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the evaluation engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum EvalError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fold(#[from] FoldError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Algorithm(#[from] AlgorithmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dataset(#[from] DatasetError),
}

// ---------------------------------------------------------------------------
// Mapping errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MappingError {
    #[error("confidence {score} for link ({source_uri}, {target_uri}) is outside [0, 1]")]
    #[diagnostic(
        code(linkeval::mapping::invalid_score),
        help(
            "Link confidences must lie in the closed interval [0, 1]. \
             Positive training examples use 1.0 and negative examples use 0.0."
        )
    )]
    InvalidScore {
        source_uri: String,
        target_uri: String,
        score: f64,
    },
}

// ---------------------------------------------------------------------------
// Fold errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FoldError {
    #[error("fold count must be at least 2, got {folds}")]
    #[diagnostic(
        code(linkeval::fold::invalid_count),
        help("Cross-validation needs one held-out fold and at least one training fold.")
    )]
    InvalidFoldCount { folds: usize },

    #[error("fold index {index} is out of range for {folds} folds")]
    #[diagnostic(
        code(linkeval::fold::index_out_of_range),
        help("The excluded test fold must be one of the generated folds.")
    )]
    IndexOutOfRange { index: usize, folds: usize },

    #[error("no negative candidate available for source \"{source_uri}\" after {attempts} draws")]
    #[diagnostic(
        code(linkeval::fold::no_negative_candidate),
        help(
            "Every target drawn from the reference pool was either a true match for this \
             source or missing from the target cache. Disable negative examples or provide \
             a reference mapping with more distinct targets."
        )
    )]
    NoNegativeCandidate { source_uri: String, attempts: usize },
}

// ---------------------------------------------------------------------------
// Algorithm errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AlgorithmError {
    #[error("unsupported implementation type \"{kind}\" for algorithm \"{algorithm}\"")]
    #[diagnostic(
        code(linkeval::algorithm::unsupported_implementation),
        help(
            "Supported implementation types are supervised_batch, supervised_active and \
             unsupervised. Check that the algorithm actually provides the requested mode."
        )
    )]
    UnsupportedImplementation { algorithm: String, kind: String },

    #[error("unknown algorithm \"{name}\"")]
    #[diagnostic(
        code(linkeval::algorithm::unknown),
        help("Register the algorithm factory with the registry before referencing it by name.")
    )]
    UnknownAlgorithm { name: String },

    #[error("invalid value for parameter \"{name}\": {message}")]
    #[diagnostic(
        code(linkeval::algorithm::invalid_parameter),
        help("Check the parameter's declared type and its [min, max] range.")
    )]
    InvalidParameter { name: String, message: String },

    #[error("learning failed in \"{algorithm}\": {message}")]
    #[diagnostic(
        code(linkeval::algorithm::learn_failed),
        help("The learner could not produce a model from the given training data.")
    )]
    LearnFailed { algorithm: String, message: String },

    #[error("prediction failed in \"{algorithm}\": {message}")]
    #[diagnostic(
        code(linkeval::algorithm::predict_failed),
        help("The learned model could not be applied to the test caches.")
    )]
    PredictFailed { algorithm: String, message: String },

    #[error("algorithm \"{algorithm}\" was used before init")]
    #[diagnostic(
        code(linkeval::algorithm::not_initialized),
        help("Call init with the parameters and caches before learning or predicting.")
    )]
    NotInitialized { algorithm: String },

    #[error("oracle failed during active learning: {0}")]
    #[diagnostic(
        code(linkeval::algorithm::oracle),
        help("The active-learning round was interrupted by its oracle.")
    )]
    Oracle(#[from] OracleError),
}

// ---------------------------------------------------------------------------
// Oracle errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OracleError {
    #[error("oracle was stopped")]
    #[diagnostic(
        code(linkeval::oracle::cancelled),
        help("Labeling was interrupted. Runs waiting on this oracle are recorded as failed.")
    )]
    Cancelled,

    #[error("oracle did not answer within {seconds} seconds")]
    #[diagnostic(
        code(linkeval::oracle::timed_out),
        help("Increase `oracle_timeout_secs` in the experiment file or use the simulated oracle.")
    )]
    TimedOut { seconds: u64 },

    #[error("oracle input closed before all examples were rated")]
    #[diagnostic(
        code(linkeval::oracle::input_closed),
        help("The console input reached end of file while examples were still pending.")
    )]
    InputClosed,
}

// ---------------------------------------------------------------------------
// Statistics errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StatsError {
    #[error("could not build {distribution} distribution: {message}")]
    #[diagnostic(
        code(linkeval::stats::distribution),
        help("The discordant-pair counts produced invalid distribution parameters.")
    )]
    Distribution {
        distribution: &'static str,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read experiment config: {path}")]
    #[diagnostic(
        code(linkeval::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse experiment config: {path}: {message}")]
    #[diagnostic(
        code(linkeval::config::parse),
        help("Check the TOML syntax and field names in the experiment file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write experiment config: {path}")]
    #[diagnostic(
        code(linkeval::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid experiment config: {message}")]
    #[diagnostic(
        code(linkeval::config::invalid),
        help("Fix the offending field in the experiment file.")
    )]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Dataset errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DatasetError {
    #[error("failed to read dataset file: {path}")]
    #[diagnostic(
        code(linkeval::dataset::read),
        help("Check that the dataset path in the experiment file is correct.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse dataset file {path}: {message}")]
    #[diagnostic(
        code(linkeval::dataset::parse),
        help(
            "Dataset files are JSON objects with `name`, `source`, `target` and \
             `reference` fields."
        )
    )]
    Parse { path: String, message: String },

    #[error("unknown dataset \"{name}\"")]
    #[diagnostic(
        code(linkeval::dataset::unknown),
        help("Declare the dataset under [[datasets]] in the experiment file.")
    )]
    Unknown { name: String },
}

/// Convenience result type for the evaluation engine.
pub type EvalResult<T> = std::result::Result<T, EvalError>;
