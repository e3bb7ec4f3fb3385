use rand::rngs::StdRng;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::layers::dense::LayerError;
use crate::math::matrix::Matrix;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("layer {index}: {source}")]
    Layer {
        index: usize,
        #[source]
        source: LayerError,
    },
    #[error("state does not fit this model: {0}")]
    StateMismatch(String),
}

/// One trainable tensor and the gradient accumulated for it.
pub struct Param<'a> {
    pub value: &'a mut Matrix,
    pub grad: &'a Matrix,
}

/// Opaque snapshot of every trainable tensor, in `parameters()` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub tensors: Vec<Matrix>,
}

/// What the training loop needs from a model. The loop never looks at the
/// architecture behind it.
pub trait Model {
    fn train_mode(&mut self);

    /// Disables stochastic regularization and gradient caching.
    fn eval_mode(&mut self);

    /// Maps a `(batch, features)` matrix to `(batch, 1)` predictions.
    fn forward(&mut self, input: &Matrix, rng: &mut StdRng) -> Result<Matrix, ModelError>;

    /// Backpropagates ∂L/∂output from the last training-mode `forward`,
    /// accumulating into each parameter's gradient.
    fn backward(&mut self, grad_output: &Matrix) -> Result<(), ModelError>;

    fn zero_grad(&mut self);

    fn parameters(&mut self) -> Vec<Param<'_>>;

    fn save_state(&self) -> ModelState;

    fn load_state(&mut self, state: ModelState) -> Result<(), ModelError>;
}
