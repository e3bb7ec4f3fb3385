use rand::rngs::StdRng;

use crate::layers::dense::Layer;
use crate::math::matrix::Matrix;
use crate::network::model::{Model, ModelError, ModelState, Param};
use crate::network::spec::NetworkSpec;

/// Feed-forward stack of dense layers, built once from a `NetworkSpec`.
#[derive(Debug, Clone)]
pub struct Network {
    pub layers: Vec<Layer>,
    training: bool,
}

impl Network {
    /// Builds every layer up front; `forward` never allocates new layers.
    pub fn new(spec: &NetworkSpec, rng: &mut StdRng) -> Network {
        let layers = spec.layers.iter()
            .map(|l| Layer::new(l.size, l.input_size, l.activation, l.dropout, rng))
            .collect();
        Network { layers, training: true }
    }
}

impl Model for Network {
    fn train_mode(&mut self) {
        self.training = true;
    }

    fn eval_mode(&mut self) {
        self.training = false;
    }

    fn forward(&mut self, input: &Matrix, rng: &mut StdRng) -> Result<Matrix, ModelError> {
        let mut current = input.clone();
        for (index, layer) in self.layers.iter_mut().enumerate() {
            current = layer
                .feed_from(&current, self.training, rng)
                .map_err(|source| ModelError::Layer { index, source })?;
        }
        Ok(current)
    }

    fn backward(&mut self, grad_output: &Matrix) -> Result<(), ModelError> {
        let mut delta = grad_output.clone();
        for (index, layer) in self.layers.iter_mut().enumerate().rev() {
            delta = layer
                .backward(&delta)
                .map_err(|source| ModelError::Layer { index, source })?;
        }
        Ok(())
    }

    fn zero_grad(&mut self) {
        self.layers.iter_mut().for_each(Layer::zero_grad);
    }

    fn parameters(&mut self) -> Vec<Param<'_>> {
        self.layers.iter_mut().flat_map(|l| l.params()).collect()
    }

    fn save_state(&self) -> ModelState {
        let tensors = self.layers.iter()
            .flat_map(|l| [l.weights.clone(), l.biases.clone()])
            .collect();
        ModelState { tensors }
    }

    fn load_state(&mut self, state: ModelState) -> Result<(), ModelError> {
        let expected = self.layers.len() * 2;
        if state.tensors.len() != expected {
            return Err(ModelError::StateMismatch(format!(
                "expected {expected} tensors, found {}",
                state.tensors.len()
            )));
        }
        for (i, (current, saved)) in self.save_state().tensors.iter().zip(&state.tensors).enumerate() {
            if !current.same_shape(saved) || saved.data.len() != saved.rows
                || saved.data.iter().any(|r| r.len() != saved.cols)
            {
                return Err(ModelError::StateMismatch(format!(
                    "tensor {i} is {}x{}, model expects {}x{}",
                    saved.rows, saved.cols, current.rows, current.cols
                )));
            }
        }

        let mut tensors = state.tensors.into_iter();
        for layer in self.layers.iter_mut() {
            if let (Some(w), Some(b)) = (tensors.next(), tensors.next()) {
                layer.weights = w;
                layer.biases = b;
            }
            layer.zero_grad();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use rand::SeedableRng;

    fn small_spec() -> NetworkSpec {
        NetworkSpec::increasing(3, ActivationFunction::Identity)
    }

    #[test]
    fn forward_yields_one_column_per_sample() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut net = Network::new(&small_spec(), &mut rng);
        let x = Matrix::from_data(vec![vec![0.1, 0.2, 0.3]; 4]);
        let out = net.forward(&x, &mut rng).unwrap();
        assert_eq!((out.rows, out.cols), (4, 1));
    }

    #[test]
    fn eval_mode_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut net = Network::new(&small_spec(), &mut rng);
        net.eval_mode();
        let x = Matrix::from_data(vec![vec![0.5, -0.5, 1.0]]);
        let a = net.forward(&x, &mut rng).unwrap();
        let b = net.forward(&x, &mut rng).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn state_round_trips_into_a_fresh_network() {
        let spec = small_spec();
        let source = Network::new(&spec, &mut StdRng::seed_from_u64(1));
        let mut target = Network::new(&spec, &mut StdRng::seed_from_u64(2));
        assert_ne!(source.save_state(), target.save_state());

        target.load_state(source.save_state()).unwrap();
        assert_eq!(source.save_state(), target.save_state());
    }

    #[test]
    fn load_state_rejects_other_architectures() {
        let other = Network::new(&NetworkSpec::increasing(5, ActivationFunction::Identity), &mut StdRng::seed_from_u64(1));
        let mut net = Network::new(&small_spec(), &mut StdRng::seed_from_u64(1));
        let err = net.load_state(other.save_state()).unwrap_err();
        assert!(matches!(err, ModelError::StateMismatch(_)));
    }

    #[test]
    fn input_width_mismatch_names_the_layer() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut net = Network::new(&small_spec(), &mut rng);
        let err = net.forward(&Matrix::zeros(1, 2), &mut rng).unwrap_err();
        assert!(matches!(err, ModelError::Layer { index: 0, .. }));
    }

    #[test]
    fn gradients_match_finite_differences() {
        let spec = NetworkSpec {
            layers: vec![
                crate::network::spec::LayerSpec { size: 3, input_size: 2, activation: ActivationFunction::Tanh, dropout: 0.0 },
                crate::network::spec::LayerSpec { size: 1, input_size: 3, activation: ActivationFunction::Sigmoid, dropout: 0.0 },
            ],
        };
        let mut rng = StdRng::seed_from_u64(11);
        let mut net = Network::new(&spec, &mut rng);
        let x = Matrix::from_data(vec![vec![0.3, -0.7]]);

        // L = output, so dL/doutput = 1.
        net.zero_grad();
        net.forward(&x, &mut rng).unwrap();
        net.backward(&Matrix::from_data(vec![vec![1.0]])).unwrap();
        let analytic = net.layers[0].params()[0].grad.data[1][2];

        let h = 1e-6;
        let mut nudged = net.clone();
        nudged.eval_mode();
        nudged.layers[0].weights.data[1][2] += h;
        let up = nudged.forward(&x, &mut rng).unwrap().data[0][0];
        nudged.layers[0].weights.data[1][2] -= 2.0 * h;
        let down = nudged.forward(&x, &mut rng).unwrap().data[0][0];

        assert!((analytic - (up - down) / (2.0 * h)).abs() < 1e-6);
    }
}
