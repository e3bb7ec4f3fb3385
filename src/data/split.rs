use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::data::dataset::Dataset;
use crate::error::{Result, TrainError};

/// Seeded shuffle, then holds out `ceil(len * test_fraction)` samples.
///
/// Returns `(train, test)`; both sides are guaranteed non-empty.
pub fn train_test_split(data: &Dataset, test_fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(TrainError::Configuration(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    let n = data.len();
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(TrainError::Data(format!(
            "{n} samples cannot be split with test fraction {test_fraction}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let (test_idx, train_idx) = indices.split_at(n_test);
    Ok((data.select(train_idx), data.select(test_idx)))
}
