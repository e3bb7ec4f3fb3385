use serde::{Serialize, Deserialize};
use crate::activation::activation::ActivationFunction;

/// Describes one layer in a network specification.
///
/// Fields:
/// - `size`       — number of neurons in this layer
/// - `input_size` — number of neurons feeding into this layer (i.e. the output
///                  size of the previous layer, or the raw input dimension for
///                  the first layer)
/// - `activation` — activation function applied after the linear transform
/// - `dropout`    — drop probability applied to the activations in training mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: usize,
    pub input_size: usize,
    pub activation: ActivationFunction,
    #[serde(default)]
    pub dropout: f64,
}

/// A fully resolved network architecture: every layer's shape is fixed here,
/// before any weights exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
}

/// Hidden widths of the tuned regression architecture.
pub const INCREASING_WIDTHS: [usize; 4] = [16, 32, 64, 128];
/// Dropout rate used between hidden layers of the tuned architecture.
pub const HIDDEN_DROPOUT: f64 = 0.1;

impl NetworkSpec {
    /// Hidden layers of widening size, ReLU + dropout after each, and a single
    /// output unit with `output` activation.
    pub fn increasing(num_features: usize, output: ActivationFunction) -> NetworkSpec {
        let mut layers = Vec::with_capacity(INCREASING_WIDTHS.len() + 1);
        let mut input_size = num_features;
        for &size in &INCREASING_WIDTHS {
            layers.push(LayerSpec {
                size,
                input_size,
                activation: ActivationFunction::ReLU,
                dropout: HIDDEN_DROPOUT,
            });
            input_size = size;
        }
        layers.push(LayerSpec { size: 1, input_size, activation: output, dropout: 0.0 });
        NetworkSpec { layers }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.input_size).unwrap_or(0)
    }

    pub fn output_activation(&self) -> Option<ActivationFunction> {
        self.layers.last().map(|l| l.activation)
    }

    /// Checks that consecutive layers connect, the output is one unit and
    /// dropout rates are probabilities below one.
    pub fn validate(&self) -> Result<(), String> {
        if self.layers.is_empty() {
            return Err("network needs at least one layer".into());
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].size != pair[1].input_size {
                return Err(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    i, pair[0].size, i + 1, pair[1].input_size
                ));
            }
        }
        if let Some(bad) = self.layers.iter().position(|l| !(0.0..1.0).contains(&l.dropout)) {
            return Err(format!("layer {bad}: dropout must be in [0, 1)"));
        }
        if self.layers.iter().any(|l| l.size == 0 || l.input_size == 0) {
            return Err("layer sizes must be positive".into());
        }
        match self.layers.last() {
            Some(last) if last.size == 1 => Ok(()),
            _ => Err("regression output layer must have exactly one unit".into()),
        }
    }
}
