use rand::{rngs::StdRng, seq::SliceRandom};

use crate::data::dataset::Dataset;
use crate::math::matrix::Matrix;

/// One mini-batch: a `(rows, features)` matrix and one target per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub features: Matrix,
    pub targets: Vec<f64>,
}

/// Cuts a dataset into `batch_size` chunks; the final chunk may be shorter.
#[derive(Debug, Clone, Copy)]
pub struct Batcher<'a> {
    data: &'a Dataset,
    batch_size: usize,
}

impl<'a> Batcher<'a> {
    /// `batch_size` must be positive; `RunConfiguration::validate` enforces it.
    pub fn new(data: &'a Dataset, batch_size: usize) -> Batcher<'a> {
        assert!(batch_size > 0, "batch_size must be at least 1");
        Batcher { data, batch_size }
    }

    pub fn num_batches(&self) -> usize {
        self.data.len().div_ceil(self.batch_size)
    }

    /// Fresh permutation for every call.
    pub fn shuffled(&self, rng: &mut StdRng) -> BatchIter<'a> {
        let mut order: Vec<usize> = (0..self.data.len()).collect();
        order.shuffle(rng);
        BatchIter { data: self.data, order, pos: 0, batch_size: self.batch_size }
    }

    pub fn ordered(&self) -> BatchIter<'a> {
        let order = (0..self.data.len()).collect();
        BatchIter { data: self.data, order, pos: 0, batch_size: self.batch_size }
    }
}

pub struct BatchIter<'a> {
    data: &'a Dataset,
    order: Vec<usize>,
    pos: usize,
    batch_size: usize,
}

impl Iterator for BatchIter<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.order.len());
        let idx = &self.order[self.pos..end];
        self.pos = end;
        Some(Batch {
            features: Matrix::from_data(idx.iter().map(|&i| self.data.features[i].clone()).collect()),
            targets: idx.iter().map(|&i| self.data.targets[i]).collect(),
        })
    }
}
