use serde::{Serialize, Deserialize};

use crate::error::{Result, TrainError};
use crate::optim::scheduler::PlateauConfig;

/// Seed used when none is given; also drives the train/test split.
pub const DEFAULT_SEED: u64 = 2022;

/// Configuration for one process's training run. Built once, never mutated.
///
/// # Fields
/// - `is_first_run`     — `true` wipes the checkpoint store and starts from
///                        scratch; `false` resumes from the `last` checkpoint
/// - `epochs_requested` — epochs to run in *this* process, on top of any
///                        already completed
/// - `learning_rate`    — initial SGD step size (fresh runs only; a resumed
///                        run continues with the checkpointed rate)
/// - `batch_size`       — samples per mini-batch
/// - `momentum`         — SGD momentum; `0.0` is plain SGD
/// - `seed`             — base seed for weight init, shuffling and dropout
/// - `scheduler`        — plateau learning-rate policy for fresh runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub is_first_run: bool,
    pub epochs_requested: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub momentum: f64,
    pub seed: u64,
    pub scheduler: PlateauConfig,
}

impl RunConfiguration {
    /// Fresh-run configuration with plain SGD and the default plateau policy.
    pub fn new(epochs_requested: usize, learning_rate: f64, batch_size: usize) -> Self {
        RunConfiguration {
            is_first_run: true,
            epochs_requested,
            learning_rate,
            batch_size,
            momentum: 0.0,
            seed: DEFAULT_SEED,
            scheduler: PlateauConfig::default(),
        }
    }

    /// Same settings, but continuing from the stored checkpoint.
    pub fn resuming(mut self) -> Self {
        self.is_first_run = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs_requested == 0 {
            return Err(TrainError::Configuration("epochs must be greater than zero".into()));
        }
        if self.batch_size == 0 {
            return Err(TrainError::Configuration("batch size must be at least 1".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::Configuration(format!(
                "learning rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(TrainError::Configuration(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        self.scheduler.validate().map_err(TrainError::Configuration)
    }
}
