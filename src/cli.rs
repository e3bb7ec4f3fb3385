//! Command-line surface: `train` runs or resumes training, `evaluate` scores a
//! stored checkpoint on the held-out split.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use rand::{rngs::StdRng, SeedableRng};

use crate::activation::activation::ActivationFunction;
use crate::checkpoint::store::{CheckpointStore, BEST};
use crate::data::{load_csv, train_test_split, Batcher, Dataset, TargetScaler};
use crate::loss::mse::MseLoss;
use crate::network::{Model, Network, NetworkSpec};
use crate::optim::scheduler::PlateauConfig;
use crate::train::{train_loop, CsvReporter, Fanout, LogReporter, RunConfiguration, Session, DEFAULT_SEED};

#[derive(Parser, Debug)]
#[command(name = "ferrite-regress", version, about = "Resumable feed-forward regression training")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train from scratch, or continue from the last checkpoint with --resume
    Train(TrainArgs),

    /// Score a stored checkpoint on the test split
    Evaluate(EvaluateArgs),
}

/// Where the data comes from and how it is split and scaled. Must be the same
/// across a fresh run and its resumptions.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// CSV file: feature columns followed by the target column
    #[arg(long)]
    pub data: PathBuf,

    /// Directory holding checkpoints and loss histories
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Fraction of samples held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    pub test_fraction: f64,

    /// Output activation; sigmoid and tanh also rescale targets into their range
    #[arg(long, default_value = "sigmoid")]
    pub output_activation: ActivationFunction,

    /// Seed for the split, weight init, shuffling and dropout
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Epochs to run in this invocation, on top of any already completed
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Initial learning rate (ignored on resume)
    #[arg(long, default_value_t = 0.1)]
    pub lr: f64,

    /// Samples per mini-batch
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// SGD momentum; 0 is plain SGD
    #[arg(long, default_value_t = 0.0)]
    pub momentum: f64,

    /// Epochs without improvement before the learning rate is cut
    #[arg(long, default_value_t = 20)]
    pub patience: usize,

    /// Continue from the last checkpoint instead of starting over
    #[arg(long)]
    pub resume: bool,

    /// Also append per-epoch metrics to this CSV file
    #[arg(long)]
    pub metrics_csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Checkpoint slot to load
    #[arg(long, default_value = BEST)]
    pub slot: String,
}

impl TrainArgs {
    pub fn run_configuration(&self) -> RunConfiguration {
        RunConfiguration {
            is_first_run: !self.resume,
            epochs_requested: self.epochs,
            learning_rate: self.lr,
            batch_size: self.batch_size,
            momentum: self.momentum,
            seed: self.data.seed,
            scheduler: PlateauConfig { patience: self.patience, ..PlateauConfig::default() },
        }
    }
}

/// Train/test datasets with targets already rescaled, plus the architecture.
struct Prepared {
    train: Dataset,
    test: Dataset,
    spec: NetworkSpec,
    scaler: Option<TargetScaler>,
}

impl DataArgs {
    fn prepare(&self) -> Result<Prepared> {
        let dataset = load_csv(&self.data)
            .with_context(|| format!("loading dataset '{}'", self.data.display()))?;
        let (mut train, mut test) = train_test_split(&dataset, self.test_fraction, self.seed)?;

        let scaler = TargetScaler::for_activation(self.output_activation, &train.targets);
        if let Some(s) = &scaler {
            s.transform_all(&mut train.targets);
            s.transform_all(&mut test.targets);
        }
        info!(
            "{} samples with {} features: {} train / {} test",
            dataset.len(), dataset.feature_dimension, train.len(), test.len()
        );

        let spec = NetworkSpec::increasing(dataset.feature_dimension, self.output_activation);
        Ok(Prepared { train, test, spec, scaler })
    }
}

impl Cli {
    pub fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Train(args) => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: &TrainArgs) -> Result<()> {
    let prepared = args.data.prepare()?;
    let config = args.run_configuration();
    let store = CheckpointStore::new(&args.data.checkpoint_dir);

    let mut session = Session::start(&config, &prepared.spec, store)
        .context("initializing training session")?;

    let mut reporter = Fanout::new().with(LogReporter);
    if let Some(path) = &args.metrics_csv {
        reporter = reporter.with(CsvReporter::create(path, config.is_first_run)?);
    }

    let train = Batcher::new(&prepared.train, config.batch_size);
    let test = Batcher::new(&prepared.test, config.batch_size);
    let summary = train_loop(&mut session, &train, &test, &mut reporter)?;

    info!(
        "finished {} epochs; best test loss {:.6}, learning rate {:e}",
        summary.epochs_run, summary.best_test_loss, summary.learning_rate
    );
    Ok(())
}

fn run_evaluate(args: &EvaluateArgs) -> Result<()> {
    let prepared = args.data.prepare()?;
    let store = CheckpointStore::new(&args.data.checkpoint_dir);
    let record = store.read(&args.slot)?;

    let mut rng = StdRng::seed_from_u64(args.data.seed);
    let mut network = Network::new(&prepared.spec, &mut rng);
    network
        .load_state(record.model)
        .with_context(|| format!("checkpoint '{}' does not fit the configured network", args.slot))?;
    network.eval_mode();

    let mut sq_err = 0.0;
    let mut sq_err_original = 0.0;
    for batch in Batcher::new(&prepared.test, 256).ordered() {
        let predicted = network.forward(&batch.features, &mut rng)?;
        sq_err += MseLoss::loss(&predicted, &batch.targets) * batch.targets.len() as f64;
        if let Some(s) = &prepared.scaler {
            for (p, y) in predicted.data.iter().zip(&batch.targets) {
                sq_err_original += (s.inverse(p[0]) - s.inverse(*y)).powi(2);
            }
        }
    }
    let n = prepared.test.len() as f64;

    println!("checkpoint '{}' (epoch {})", args.slot, record.epoch_index);
    println!("test MSE: {:.6}", sq_err / n);
    if prepared.scaler.is_some() {
        println!("test RMSE (target units): {:.6}", (sq_err_original / n).sqrt());
    }
    Ok(())
}
