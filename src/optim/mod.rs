pub mod scheduler;
pub mod sgd;

pub use scheduler::{PlateauConfig, PlateauScheduler, PlateauState};
pub use sgd::{Sgd, SgdState};
