use crate::math::matrix::Matrix;

/// Mean-squared error over a batch of scalar predictions.
///
/// `predicted` is `(batch, 1)`; `expected` holds one target per row.
pub struct MseLoss;

impl MseLoss {
    /// Scalar MSE: mean((predicted - expected)²)
    pub fn loss(predicted: &Matrix, expected: &[f64]) -> f64 {
        let n = expected.len() as f64;
        predicted.data.iter().zip(expected.iter())
            .map(|(p, y)| (p[0] - y).powi(2))
            .sum::<f64>() / n
    }

    /// ∂loss/∂predicted: 2·(predicted - expected) / n
    pub fn derivative(predicted: &Matrix, expected: &[f64]) -> Matrix {
        let scale = 2.0 / expected.len() as f64;
        Matrix::from_data(
            predicted.data.iter().zip(expected.iter())
                .map(|(p, y)| vec![scale * (p[0] - y)])
                .collect()
        )
    }

    /// Shape check done before every loss evaluation.
    pub fn check_shapes(predicted: &Matrix, expected: &[f64]) -> Result<(), String> {
        if expected.is_empty() {
            return Err("empty batch".into());
        }
        if predicted.cols != 1 || predicted.rows != expected.len() {
            return Err(format!(
                "prediction shape {}x{} does not match {} targets",
                predicted.rows, predicted.cols, expected.len()
            ));
        }
        Ok(())
    }
}
