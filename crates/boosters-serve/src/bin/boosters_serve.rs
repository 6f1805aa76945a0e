//! `boosters-serve` command-line entry point.
//!
//! Usage:
//!   boosters-serve predict --file batch.csv
//!   boosters-serve features --input data/raw/multisim_dataset.parquet --output features.parquet
//!   boosters-serve train --input features.parquet --output models/multisim_gbdt.bsrv
//!   boosters-serve inspect --artifact models/multisim_gbdt.bsrv
//!
//! `predict` prints the JSON response body on stdout and exits with 0 on
//! success, 2 on bad input and 1 on a server fault.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use boosters_serve::artifact::ArtifactStore;
use boosters_serve::jobs::{self, FeatureJobConfig, TrainJobConfig};
use boosters_serve::{InferenceService, PipelineConfig, ServeConfig, UploadedBlob, logging};

#[derive(Debug, Parser)]
#[command(name = "boosters-serve", version, about = "Batch tabular inference with boosted classifiers")]
struct Cli {
    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pipeline artifact path (overrides config and environment).
    #[arg(long, global = true)]
    artifact: Option<PathBuf>,

    /// Log filter, e.g. `info` or `boosters_serve=debug`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Worker threads (default: all cores).
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Predict one label per row of a data file.
    Predict {
        #[arg(long)]
        file: PathBuf,
        /// File name used for format detection (default: the file's own name).
        #[arg(long)]
        filename: Option<String>,
    },

    /// Clean a raw Parquet file into a feature table.
    Features {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Keep at most this many rows.
        #[arg(long, conflicts_with = "all_rows")]
        max_rows: Option<usize>,
        /// Keep every row.
        #[arg(long)]
        all_rows: bool,
    },

    /// Fit the pipeline on a feature table and write the artifact.
    Train {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Artifact output path (default: the configured artifact path).
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "target")]
        target: String,
        #[arg(long)]
        n_trees: Option<u32>,
        #[arg(long, default_value_t = 0.2)]
        test_size: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Print an artifact's header, metadata and feature contract.
    Inspect,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = ServeConfig::load(cli.config.as_deref())?;
    if let Some(artifact) = cli.artifact {
        config.artifact_path = artifact;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    if cli.threads.is_some() {
        config.n_threads = cli.threads;
    }
    config.validate()?;
    logging::init(&config.logging)?;

    if let Some(n_threads) = config.thread_count() {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads.get())
            .build_global()
            .context("failed to configure thread pool")?;
    }

    match cli.command {
        Command::Predict { file, filename } => predict(&config, file, filename),
        Command::Features {
            input,
            output,
            max_rows,
            all_rows,
        } => {
            let defaults = FeatureJobConfig::default();
            let job = FeatureJobConfig {
                input: input.unwrap_or(defaults.input),
                output: output.unwrap_or(defaults.output),
                max_rows: if all_rows { None } else { max_rows.or(defaults.max_rows) },
                ..defaults
            };
            let table = jobs::features::run(&job)?;
            println!("wrote {} rows to {}", table.n_rows(), job.output.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Train {
            input,
            output,
            target,
            n_trees,
            test_size,
            seed,
        } => {
            let pipeline = PipelineConfig::builder()
                .maybe_n_trees(n_trees)
                .maybe_n_threads(config.thread_count())
                .build()?;
            let defaults = TrainJobConfig::default();
            let job = TrainJobConfig {
                input: input.unwrap_or(defaults.input),
                output: output.unwrap_or_else(|| config.artifact_path.clone()),
                target,
                test_size,
                seed,
                pipeline,
            };
            let report = jobs::train::run(&job)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect => inspect(&config),
    }
}

fn predict(config: &ServeConfig, file: PathBuf, filename: Option<String>) -> Result<ExitCode> {
    let service = InferenceService::from_config(config).context("startup failed")?;

    let bytes = fs::read(&file).with_context(|| format!("cannot read {}", file.display()))?;
    let filename = filename
        .or_else(|| file.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_default();

    let (status, body) = service.respond(UploadedBlob::new(bytes, filename));
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(match status {
        200 => ExitCode::SUCCESS,
        400..=499 => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    })
}

fn inspect(config: &ServeConfig) -> Result<ExitCode> {
    let loaded = ArtifactStore::default().load(&config.artifact_path)?;
    let header = loaded.header;
    let pipeline = &loaded.pipeline;

    println!("artifact:   {}", config.artifact_path.display());
    println!("version:    {}.{}", header.version_major, header.version_minor);
    println!("producer:   {}", loaded.metadata.producer);
    println!("classes:    {}", join(pipeline.classes()));
    println!("trees:      {}", pipeline.forest().n_trees());
    for (key, value) in &loaded.metadata.attributes {
        println!("{:<11} {value}", format!("{key}:"));
    }
    println!("features:");
    for spec in pipeline.transform().contract().features() {
        println!("  {:<20} {:?}", spec.name, spec.kind);
    }
    Ok(ExitCode::SUCCESS)
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
