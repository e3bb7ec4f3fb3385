use serde::{Serialize, Deserialize};

use crate::checkpoint::unbounded;
use crate::network::model::ModelState;
use crate::optim::scheduler::PlateauState;
use crate::optim::sgd::SgdState;

/// A complete snapshot taken at the end of epoch `epoch_index`, sufficient to
/// resume training exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub epoch_index: usize,
    pub model: ModelState,
    pub optimizer: SgdState,
    pub scheduler: PlateauState,
    #[serde(with = "unbounded")]
    pub best_test_loss: f64,
}

/// Per-epoch mean losses, one entry per completed epoch across every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    pub train_losses: Vec<f64>,
    pub test_losses: Vec<f64>,
}

impl LossHistory {
    pub fn push(&mut self, train_loss: f64, test_loss: f64) {
        self.train_losses.push(train_loss);
        self.test_losses.push(test_loss);
    }

    /// Number of epochs recorded. Only meaningful when `is_aligned`.
    pub fn len(&self) -> usize {
        self.train_losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_losses.is_empty() && self.test_losses.is_empty()
    }

    pub fn is_aligned(&self) -> bool {
        self.train_losses.len() == self.test_losses.len()
    }

    pub fn truncate(&mut self, epochs: usize) {
        self.train_losses.truncate(epochs);
        self.test_losses.truncate(epochs);
    }

    /// Lowest test loss so far, or `+inf` before the first epoch.
    pub fn best_test_loss(&self) -> f64 {
        self.test_losses.iter().copied().fold(f64::INFINITY, f64::min)
    }
}
