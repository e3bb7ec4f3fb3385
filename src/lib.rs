pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod checkpoint;
pub mod data;
pub mod train;
pub mod cli;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::{Model, Network, NetworkSpec};
pub use loss::mse::MseLoss;
pub use optim::{PlateauConfig, PlateauScheduler, Sgd};
pub use checkpoint::{CheckpointRecord, CheckpointStore, LossHistory};
pub use data::{Batcher, Dataset, TargetScaler};
pub use train::{train_loop, EpochStats, Reporter, RunConfiguration, RunSummary, Session};
pub use error::{Result, TrainError};
