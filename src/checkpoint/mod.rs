pub mod record;
pub mod store;
pub(crate) mod unbounded;

pub use record::{CheckpointRecord, LossHistory};
pub use store::{CheckpointStore, BEST, LAST};
