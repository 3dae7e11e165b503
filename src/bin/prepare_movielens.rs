extern crate bst;
extern crate clap;
extern crate failure;
#[macro_use]
extern crate tracing;
extern crate tracing_subscriber;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bst::encoder::Hyperparameters;
use bst::pipeline::{self, PipelineConfig};

/// Window MovieLens-1M rating histories into train and test files.
#[derive(Parser, Debug)]
#[command(name = "prepare_movielens", version)]
struct Args {
    /// Directory holding users.dat, ratings.dat and movies.dat.
    #[arg(default_value = "ml-1m")]
    data_dir: PathBuf,
    /// Directory the train and test files are written to.
    #[arg(default_value = ".")]
    output_dir: PathBuf,
    /// JSON pipeline configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Window size: history steps plus the target.
    #[arg(long)]
    sequence_length: Option<usize>,
    /// Distance between successive window starts.
    #[arg(long)]
    step_size: Option<usize>,
    /// Probability that a row lands in the training split.
    #[arg(long)]
    train_fraction: Option<f64>,
    /// Seed for the split and the sanity-check encoder.
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig, failure::Error> {
        let mut config = match self.config {
            Some(ref path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::new(),
        };

        if let Some(sequence_length) = self.sequence_length {
            config = config.sequence_length(sequence_length);
        }
        if let Some(step_size) = self.step_size {
            config = config.step_size(step_size);
        }
        if let Some(train_fraction) = self.train_fraction {
            config = config.train_fraction(train_fraction);
        }
        if let Some(seed) = self.seed {
            config = config.seed(seed);
        }

        Ok(config)
    }
}

fn main() -> Result<(), failure::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bst=info,prepare_movielens=info")),
        )
        .init();

    let args = Args::parse();
    let config = args.pipeline_config()?;

    let prepared = pipeline::run(&args.data_dir, &args.output_dir, &config)?;

    // Encode one batch to check the written rows are model-ready.
    let train = prepared.train_examples()?;
    let mut hyperparameters = Hyperparameters::new(config.sequence_length);
    if let Some(bytes) = config.seed_bytes() {
        hyperparameters = hyperparameters.from_seed(bytes);
    }
    let encoder = hyperparameters.build(&prepared.feature_space)?;

    match train.iter_minibatch(128).next() {
        Some(batch) => {
            let encoded = encoder.encode_batch(batch)?;
            info!(
                examples = encoded.len(),
                sequence = ?encoded[0].sequence.dim(),
                other_features = encoded[0].other_features.len(),
                "Encoded first training batch"
            );
        }
        None => warn!("No training rows were produced"),
    }

    Ok(())
}
