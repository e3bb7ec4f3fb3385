use serde::{Serialize, Deserialize};
use std::f64::consts::E;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Identity,
    Tanh,
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity => x,
            ActivationFunction::Tanh => x.tanh(),
        }
    }

    /// Element-wise derivative, evaluated at the pre-activation `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            },
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
        }
    }

    /// The bounded range this activation can produce, if any.
    ///
    /// When used on the output layer, regression targets are rescaled into
    /// this range before training.
    pub fn output_range(&self) -> Option<(f64, f64)> {
        match self {
            ActivationFunction::Sigmoid => Some((0.0, 1.0)),
            ActivationFunction::Tanh => Some((-1.0, 1.0)),
            ActivationFunction::ReLU | ActivationFunction::Identity => None,
        }
    }
}

impl std::str::FromStr for ActivationFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sigmoid" => Ok(ActivationFunction::Sigmoid),
            "relu" => Ok(ActivationFunction::ReLU),
            "identity" | "linear" => Ok(ActivationFunction::Identity),
            "tanh" => Ok(ActivationFunction::Tanh),
            other => Err(format!("unknown activation '{other}'")),
        }
    }
}
