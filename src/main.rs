//! linkeval CLI: evaluate and compare link-discovery learners.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use linkeval::algorithm::registry::AlgorithmRegistry;
use linkeval::cache::Cache;
use linkeval::config::{ExperimentConfig, OracleKind};
use linkeval::dataset::JsonDatasetLoader;
use linkeval::evaluator::Evaluator;
use linkeval::fold::FoldGenerator;
use linkeval::oracle::{CancellationToken, ConsoleOracle};
use linkeval::run::{RunStatus, Summary};
use linkeval::stats::{SignificanceTable, mcnemar};

#[derive(Parser)]
#[command(name = "linkeval", version, about = "Evaluate and compare link-discovery learners")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Train on the training mapping, score on the full reference.
    Plain,
    /// Hold out the last fold, train on the rest.
    Cv,
    /// Every fold as test fold, tuned parameters, McNemar comparisons.
    Tuned,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment file.
    Run {
        /// Experiment TOML file.
        #[arg(long)]
        config: PathBuf,

        /// Override the experiment's seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Override the experiment's fold count.
        #[arg(long)]
        folds: Option<usize>,

        /// Write the summary as JSON to this file.
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "tuned")]
        mode: Mode,
    },

    /// Partition a dataset into folds and print their sizes.
    Folds {
        /// JSON dataset file.
        #[arg(long)]
        dataset: PathBuf,

        #[arg(long, default_value = "10")]
        folds: usize,

        /// Sample negative examples.
        #[arg(long)]
        negatives: bool,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// McNemar's test on discordant counts.
    Mcnemar {
        /// Instances where A is right and B is wrong.
        #[arg(long)]
        successes: u64,

        /// Instances where B is right and A is wrong.
        #[arg(long)]
        failures: u64,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            seed,
            folds,
            out,
            mode,
        } => run(&config, seed, folds, out.as_deref(), mode)?,

        Commands::Folds {
            dataset,
            folds,
            negatives,
            seed,
        } => {
            let data = JsonDatasetLoader::new().load_path(&dataset)?;
            let generated = FoldGenerator::new(folds)
                .with_negative_examples(negatives)
                .with_seed(seed)
                .generate(&data.reference, data.source.as_ref(), data.target.as_ref())?;
            println!("{:>5} {:>9} {:>9} {:>8} {:>8}", "fold", "positive", "negative", "sources", "targets");
            for (i, fold) in generated.iter().enumerate() {
                let positives = fold.mapping.positive_count();
                println!(
                    "{i:>5} {positives:>9} {:>9} {:>8} {:>8}",
                    fold.mapping.size() - positives,
                    fold.source.len(),
                    fold.target.len(),
                );
            }
        }

        Commands::Mcnemar {
            successes,
            failures,
        } => {
            let outcome = mcnemar(successes, failures)?;
            println!("p-value:   {:.6}", outcome.p_value);
            println!("statistic: {:.6}", outcome.statistic);
            println!("method:    {:?}", outcome.method);
        }
    }

    Ok(())
}

fn run(
    path: &Path,
    seed: Option<u64>,
    folds: Option<usize>,
    out: Option<&Path>,
    mode: Mode,
) -> Result<()> {
    let mut experiment = ExperimentConfig::load(path)?;
    if seed.is_some() {
        experiment.evaluation.seed = seed;
    }
    if let Some(folds) = folds {
        experiment.evaluation.folds = folds;
    }
    experiment.validate()?;

    let base_dir = path.parent().unwrap_or(Path::new("."));
    let registry = AlgorithmRegistry::with_builtins();
    let tasks = experiment.tasks(&registry)?;
    let datasets = experiment.load_datasets(base_dir)?;

    let cancel = CancellationToken::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag()).into_diagnostic()?;

    let mut evaluator = Evaluator::new(experiment.evaluator_config()).with_cancellation(cancel.clone());
    if experiment.evaluation.oracle == OracleKind::Console {
        evaluator = evaluator.with_oracle(Arc::new(ConsoleOracle::stdin(
            experiment.evaluation.oracle_max_rounds,
            Duration::from_secs(experiment.evaluation.oracle_timeout_secs),
            cancel.clone(),
        )));
    }

    tracing::info!(
        algorithms = tasks.len(),
        datasets = datasets.len(),
        folds = experiment.evaluation.folds,
        "starting experiment"
    );
    let summary = match mode {
        Mode::Plain => evaluator.evaluate(&tasks, &datasets)?,
        Mode::Tuned => evaluator.cross_validate_with_tuning_and_statistical_test(&tasks, &datasets)?,
        Mode::Cv => {
            let mut runs = Vec::new();
            for task in &tasks {
                runs.extend(evaluator.cross_validate(task, &datasets)?.runs);
            }
            Summary::new(runs, experiment.evaluation.folds, SignificanceTable::new())
        }
    };
    if cancel.is_cancelled() {
        tracing::warn!("interrupted, summary is partial");
    }

    print_summary(&summary);
    if let Some(out) = out {
        let json = summary.to_json().into_diagnostic()?;
        std::fs::write(out, json).into_diagnostic()?;
        tracing::info!(path = %out.display(), "wrote summary");
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("{:<20} {:<20} {:<10} {:>8} {:>8} {:>5}", "algorithm", "dataset", "measure", "mean", "std", "runs");
    for ((algorithm, dataset, measure), agg) in summary.aggregate() {
        println!(
            "{algorithm:<20} {dataset:<20} {:<10} {:>8.4} {:>8.4} {:>5}",
            measure.to_string(),
            agg.mean,
            agg.std_dev,
            agg.runs
        );
    }

    for run in summary.failed_runs() {
        if let RunStatus::Failed { message } = &run.status {
            println!("FAILED {} on {} (fold {:?}): {message}", run.algorithm, run.dataset, run.fold);
        }
    }

    if !summary.significance.is_empty() {
        println!();
        println!("{:<20} {:<20} {:<20} {:>7} {:>7} {:>10}", "dataset", "a", "b", "a only", "b only", "p-value");
        for result in summary.significance.iter() {
            println!(
                "{:<20} {:<20} {:<20} {:>7} {:>7} {:>10.6}",
                result.key.dataset,
                result.key.algorithm_a,
                result.key.algorithm_b,
                result.counts.successes,
                result.counts.failures,
                result.outcome.p_value
            );
        }
    }
}
