//! Plateau-driven learning-rate reduction.
//!
//! Watches a metric that should go down (the epoch's mean train loss). When
//! it has failed to improve for more than `patience` consecutive epochs, the
//! optimizer's learning rate is multiplied by `factor`, never going below
//! `min_lr`.

use serde::{Serialize, Deserialize};

use crate::checkpoint::unbounded;
use crate::optim::sgd::Sgd;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub factor: f64,
    pub patience: usize,
    pub min_lr: f64,
    /// Relative improvement required: `new < best * (1 - threshold)`.
    pub threshold: f64,
    /// Epochs to wait after a reduction before counting bad epochs again.
    pub cooldown: usize,
    /// Reductions smaller than this are skipped.
    pub eps: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        PlateauConfig {
            factor: 0.1,
            patience: 20,
            min_lr: 1e-12,
            threshold: 1e-4,
            cooldown: 0,
            eps: 1e-8,
        }
    }
}

impl PlateauConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.factor > 0.0 && self.factor < 1.0) {
            return Err(format!("plateau factor must be in (0, 1), got {}", self.factor));
        }
        if self.min_lr < 0.0 || self.threshold < 0.0 || self.eps < 0.0 {
            return Err("plateau min_lr, threshold and eps must be non-negative".into());
        }
        Ok(())
    }
}

/// Serializable scheduler state, including its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauState {
    pub config: PlateauConfig,
    #[serde(with = "unbounded")]
    pub best: f64,
    pub num_bad_epochs: usize,
    pub cooldown_counter: usize,
    pub last_epoch: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateauScheduler {
    state: PlateauState,
}

impl PlateauScheduler {
    pub fn new(config: PlateauConfig) -> PlateauScheduler {
        PlateauScheduler {
            state: PlateauState {
                config,
                best: f64::INFINITY,
                num_bad_epochs: 0,
                cooldown_counter: 0,
                last_epoch: 0,
            },
        }
    }

    pub fn from_state(state: PlateauState) -> PlateauScheduler {
        PlateauScheduler { state }
    }

    pub fn state(&self) -> &PlateauState {
        &self.state
    }

    fn is_better(&self, metric: f64) -> bool {
        metric < self.state.best * (1.0 - self.state.config.threshold)
    }

    /// Feeds one epoch's metric. Returns the new learning rate when this call
    /// reduced it.
    pub fn step(&mut self, metric: f64, optimizer: &mut Sgd) -> Option<f64> {
        self.state.last_epoch += 1;

        if self.is_better(metric) {
            self.state.best = metric;
            self.state.num_bad_epochs = 0;
        } else {
            self.state.num_bad_epochs += 1;
        }

        if self.state.cooldown_counter > 0 {
            self.state.cooldown_counter -= 1;
            self.state.num_bad_epochs = 0;
        }

        if self.state.num_bad_epochs <= self.state.config.patience {
            return None;
        }

        self.state.cooldown_counter = self.state.config.cooldown;
        self.state.num_bad_epochs = 0;

        let old_lr = optimizer.learning_rate;
        let new_lr = (old_lr * self.state.config.factor).max(self.state.config.min_lr);
        if old_lr - new_lr > self.state.config.eps {
            optimizer.learning_rate = new_lr;
            Some(new_lr)
        } else {
            None
        }
    }
}
