pub mod batcher;
pub mod dataset;
pub mod scaling;
pub mod split;

pub use batcher::{Batch, Batcher};
pub use dataset::{load_csv, parse_csv, Dataset};
pub use scaling::TargetScaler;
pub use split::train_test_split;
