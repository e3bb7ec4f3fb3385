use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;
use crate::network::model::Param;

/// Everything needed to rebuild an `Sgd` exactly where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdState {
    pub learning_rate: f64,
    pub momentum: f64,
    /// One buffer per parameter; empty until the first step with momentum.
    pub velocities: Vec<Matrix>,
}

/// Stochastic gradient descent with optional (heavy-ball) momentum.
///
/// With `momentum == 0` each step is `p -= lr * g`. Otherwise
/// `v = momentum * v + g; p -= lr * v`, with `v` starting at the first
/// gradient seen.
#[derive(Debug, Clone)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    velocities: Vec<Matrix>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd::with_momentum(learning_rate, 0.0)
    }

    pub fn with_momentum(learning_rate: f64, momentum: f64) -> Sgd {
        Sgd { learning_rate, momentum, velocities: Vec::new() }
    }

    pub fn from_state(state: SgdState) -> Sgd {
        Sgd {
            learning_rate: state.learning_rate,
            momentum: state.momentum,
            velocities: state.velocities,
        }
    }

    pub fn state(&self) -> SgdState {
        SgdState {
            learning_rate: self.learning_rate,
            momentum: self.momentum,
            velocities: self.velocities.clone(),
        }
    }

    /// Applies one update to every parameter from its accumulated gradient.
    pub fn step(&mut self, params: Vec<Param<'_>>) -> Result<(), String> {
        if self.momentum == 0.0 {
            for p in params {
                Self::descend(p.value, p.grad, self.learning_rate);
            }
            return Ok(());
        }

        if self.velocities.is_empty() {
            self.velocities = params.iter().map(|p| p.grad.clone()).collect();
        } else {
            self.check_buffers(&params)?;
            for (v, p) in self.velocities.iter_mut().zip(params.iter()) {
                *v = v.map(|x| x * self.momentum);
                v.add_assign(p.grad);
            }
        }

        for (p, v) in params.into_iter().zip(self.velocities.iter()) {
            Self::descend(p.value, v, self.learning_rate);
        }
        Ok(())
    }

    /// Momentum buffers, when present, must pair one-to-one with `params`
    /// and share their shapes. No buffers at all is always valid.
    pub fn check_buffers(&self, params: &[Param<'_>]) -> Result<(), String> {
        if self.velocities.is_empty() {
            return Ok(());
        }
        if self.velocities.len() != params.len() {
            return Err(format!(
                "optimizer tracks {} buffers but model has {} parameters",
                self.velocities.len(), params.len()
            ));
        }
        for (i, (v, p)) in self.velocities.iter().zip(params).enumerate() {
            if !v.same_shape(p.value) {
                return Err(format!(
                    "momentum buffer {i} is {}x{}, parameter is {}x{}",
                    v.rows, v.cols, p.value.rows, p.value.cols
                ));
            }
        }
        Ok(())
    }

    fn descend(value: &mut Matrix, direction: &Matrix, lr: f64) {
        value.add_assign(&direction.map(|g| -lr * g));
    }
}
