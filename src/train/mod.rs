pub mod epoch_stats;
pub mod loop_fn;
pub mod report;
pub mod session;
pub mod train_config;

pub use epoch_stats::EpochStats;
pub use loop_fn::{train_loop, RunSummary};
pub use report::{CsvReporter, Fanout, LogReporter, Reporter};
pub use session::Session;
pub use train_config::{RunConfiguration, DEFAULT_SEED};
