use rand::Rng;
use thiserror::Error;

use crate::{math::matrix::Matrix, activation::activation::ActivationFunction};
use crate::network::model::Param;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayerError {
    #[error("expected {expected} input features, got {got}")]
    Shape { expected: usize, got: usize },
    #[error("backward called without a training-mode forward pass")]
    NoForwardCache,
}

/// Values kept from the last training-mode forward pass for backprop.
#[derive(Debug, Clone)]
struct ForwardCache {
    inputs: Matrix,
    pre_neurons: Matrix,  // z = xW + b, needed for the activation derivative
    mask: Option<Matrix>, // inverted-dropout mask, already scaled by 1 / keep
}

/// Fully-connected layer: `a = dropout(activation(x·W + b))`.
///
/// Weights are `(input_size, size)`, biases `(1, size)`. Gradients accumulate
/// across `backward` calls until `zero_grad`.
#[derive(Debug, Clone)]
pub struct Layer{
    pub size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction,
    pub dropout: f64,
    weights_grad: Matrix,
    biases_grad: Matrix,
    cache: Option<ForwardCache>,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        dropout: f64,
        rng: &mut R,
    ) -> Layer {
        let weights = match activation {
            ActivationFunction::ReLU => Matrix::he(input_size, size, rng),
            _ => Matrix::xavier(input_size, size, rng),
        };

        Layer {
            size,
            weights,
            biases: Matrix::zeros(1, size),
            activator: activation,
            dropout,
            weights_grad: Matrix::zeros(input_size, size),
            biases_grad: Matrix::zeros(1, size),
            cache: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    /// Forward pass over a batch (one sample per row).
    ///
    /// In training mode the inputs and pre-activations are cached and dropout
    /// is applied; in eval mode nothing is cached and dropout is the identity.
    pub fn feed_from<R: Rng + ?Sized>(
        &mut self,
        input: &Matrix,
        training: bool,
        rng: &mut R,
    ) -> Result<Matrix, LayerError> {
        if input.cols != self.input_size() {
            return Err(LayerError::Shape { expected: self.input_size(), got: input.cols });
        }

        let z = (input * &self.weights).add_row(&self.biases);
        let a = z.map(|x| self.activator.function(x));

        if !training {
            self.cache = None;
            return Ok(a);
        }

        let (out, mask) = if self.dropout > 0.0 {
            let keep = 1.0 - self.dropout;
            let mut mask = Matrix::zeros(a.rows, a.cols);
            for row in mask.data.iter_mut() {
                for m in row.iter_mut() {
                    if rng.gen::<f64>() < keep {
                        *m = 1.0 / keep;
                    }
                }
            }
            (a.hadamard(&mask), Some(mask))
        } else {
            (a, None)
        };

        self.cache = Some(ForwardCache { inputs: input.clone(), pre_neurons: z, mask });
        Ok(out)
    }

    /// Accumulates parameter gradients and returns ∂L/∂input.
    ///
    /// `grad_output` is ∂L/∂a for this layer's (post-dropout) output.
    pub fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix, LayerError> {
        let cache = self.cache.as_ref().ok_or(LayerError::NoForwardCache)?;
        if grad_output.cols != self.size {
            return Err(LayerError::Shape { expected: self.size, got: grad_output.cols });
        }

        let grad = match &cache.mask {
            Some(mask) => grad_output.hadamard(mask),
            None => grad_output.clone(),
        };
        // δ = error ⊙ σ'(z)
        let act_derivative = cache.pre_neurons.map(|x| self.activator.derivative(x));
        let delta = grad.hadamard(&act_derivative);

        self.weights_grad.add_assign(&(&cache.inputs.transpose() * &delta));
        self.biases_grad.add_assign(&delta.sum_rows());

        Ok(&delta * &self.weights.transpose())
    }

    pub fn zero_grad(&mut self) {
        self.weights_grad.fill(0.0);
        self.biases_grad.fill(0.0);
    }

    /// Weights then biases, each paired with its accumulated gradient.
    pub fn params(&mut self) -> [Param<'_>; 2] {
        [
            Param { value: &mut self.weights, grad: &self.weights_grad },
            Param { value: &mut self.biases, grad: &self.biases_grad },
        ]
    }
}
