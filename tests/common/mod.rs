#![allow(dead_code)]

use ferrite_regress::{ActivationFunction, Dataset, NetworkSpec, PlateauConfig, RunConfiguration};
use ferrite_regress::network::LayerSpec;

/// Smooth synthetic regression problem: y = 0.5·x0 − 0.25·x1 + 0.1·x0·x2.
pub fn synthetic(n: usize) -> Dataset {
    let features: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            vec![t, (t * 7.0).sin(), (t * 3.0).cos()]
        })
        .collect();
    let targets = features.iter().map(|x| 0.5 * x[0] - 0.25 * x[1] + 0.1 * x[0] * x[2]).collect();
    Dataset::new(features, targets).unwrap()
}

/// Small network with dropout so that train/eval modes differ.
pub fn small_spec(inputs: usize) -> NetworkSpec {
    NetworkSpec {
        layers: vec![
            LayerSpec { size: 8, input_size: inputs, activation: ActivationFunction::ReLU, dropout: 0.1 },
            LayerSpec { size: 4, input_size: 8, activation: ActivationFunction::Tanh, dropout: 0.0 },
            LayerSpec { size: 1, input_size: 4, activation: ActivationFunction::Identity, dropout: 0.0 },
        ],
    }
}

pub fn config(epochs: usize, batch_size: usize) -> RunConfiguration {
    RunConfiguration {
        is_first_run: true,
        epochs_requested: epochs,
        learning_rate: 0.02,
        batch_size,
        momentum: 0.9,
        seed: 11,
        scheduler: PlateauConfig::default(),
    }
}
