use std::path::PathBuf;

use thiserror::Error;

/// Every failure the training pipeline can surface.
///
/// Nothing in the crate retries on its own: each variant carries enough
/// context (epoch, batch, slot name, file path) for a human to decide what to
/// do next.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Invalid run configuration, detected at startup.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Resume was requested but the named slot has never been written.
    #[error("checkpoint '{name}' not found; start a fresh run to recover")]
    CheckpointMissing { name: String },

    /// A slot exists but cannot be decoded or does not fit the model.
    #[error("checkpoint '{name}' is corrupt: {reason}")]
    CheckpointCorrupt { name: String, reason: String },

    /// A single batch failed (divergence, shape mismatch); the epoch is aborted.
    #[error("epoch {epoch}, batch {batch}: {reason}")]
    BatchComputation {
        epoch: usize,
        batch: usize,
        reason: String,
    },

    /// Disk-level failure while touching the checkpoint directory.
    #[error("{op} failed for '{}'{}: {source}", path.display(), during_epoch(epoch))]
    Persistence {
        op: &'static str,
        path: PathBuf,
        epoch: Option<usize>,
        #[source]
        source: std::io::Error,
    },

    /// Dataset ingestion or splitting failed.
    #[error("data error: {0}")]
    Data(String),
}

impl TrainError {
    pub(crate) fn persistence(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrainError::Persistence { op, path: path.into(), epoch: None, source }
    }

    /// Tags a persistence failure with the epoch whose state was being saved.
    pub(crate) fn at_epoch(self, epoch: usize) -> Self {
        match self {
            TrainError::Persistence { op, path, source, .. } => {
                TrainError::Persistence { op, path, epoch: Some(epoch), source }
            }
            other => other,
        }
    }

    pub(crate) fn corrupt(name: impl Into<String>, reason: impl ToString) -> Self {
        TrainError::CheckpointCorrupt { name: name.into(), reason: reason.to_string() }
    }
}

fn during_epoch(epoch: &Option<usize>) -> String {
    epoch.map(|e| format!(" while saving epoch {e}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, TrainError>;
