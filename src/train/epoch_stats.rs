use serde::{Serialize, Deserialize};

/// Per-epoch summary handed to every `Reporter` once the epoch's checkpoint
/// has been written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 0-based epoch index, continuous across resumed runs.
    pub epoch: usize,
    /// Exclusive end of this process's epoch range.
    pub end_epoch: usize,
    /// Mean of the per-batch training losses.
    pub train_loss: f64,
    /// Mean of the per-batch evaluation losses.
    pub test_loss: f64,
    /// Learning rate after the scheduler saw this epoch's train loss.
    pub learning_rate: f64,
    /// `true` when this epoch set a new best test loss.
    pub improved: bool,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
