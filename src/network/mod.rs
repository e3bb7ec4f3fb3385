pub mod model;
pub mod network;
pub mod spec;

pub use model::{Model, ModelError, ModelState, Param};
pub use network::Network;
pub use spec::{NetworkSpec, LayerSpec};
