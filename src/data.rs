//! Data sources feeding mini-batches into the inference loop.

use burn::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::marker::PhantomData;

/// A source of observed data.
pub trait DataSource<B: Backend> {
    /// Draws a mini-batch of `n` observations, or the full dataset if `None`.
    fn sample(&mut self, n: Option<usize>) -> Tensor<B, 1>;
}

/// An in-memory dataset backed by a host vector, subsampled without
/// replacement.
#[derive(Debug, Clone)]
pub struct SliceData<B: Backend> {
    values: Vec<f64>,
    rng: SmallRng,
    _backend: PhantomData<B>,
}

impl<B: Backend> SliceData<B> {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            rng: SmallRng::from_entropy(),
            _backend: PhantomData,
        }
    }

    /// Returns a new instance seeded with `seed`.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn to_tensor(&self, values: Vec<f64>) -> Tensor<B, 1> {
        let len = values.len();
        let td: TensorData = TensorData::new(values, [len]);
        Tensor::<B, 1>::from_data(td, &B::Device::default())
    }
}

impl<B: Backend> DataSource<B> for SliceData<B> {
    fn sample(&mut self, n: Option<usize>) -> Tensor<B, 1> {
        match n {
            None => self.to_tensor(self.values.clone()),
            Some(n) => {
                let n = n.min(self.values.len());
                let picked = rand::seq::index::sample(&mut self.rng, self.values.len(), n)
                    .into_iter()
                    .map(|i| self.values[i])
                    .collect();
                self.to_tensor(picked)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::to_vec_f64;
    use burn::backend::NdArray;

    type BackendType = NdArray<f64>;

    #[test]
    fn test_full_dataset_when_unset() {
        let mut data = SliceData::<BackendType>::new(vec![1.0, 2.0, 3.0]).set_seed(42);
        let batch = data.sample(None);
        assert_eq!(to_vec_f64(&batch), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_subsample_draws_from_dataset() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut data = SliceData::<BackendType>::new(values.clone()).set_seed(42);
        let batch = to_vec_f64(&data.sample(Some(3)));
        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|v| values.contains(v)));
    }

    #[test]
    fn test_subsample_is_capped_at_dataset_size() {
        let mut data = SliceData::<BackendType>::new(vec![1.0, 2.0]).set_seed(42);
        assert_eq!(to_vec_f64(&data.sample(Some(10))).len(), 2);
    }

    #[test]
    fn test_seeding_is_reproducible() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let mut a = SliceData::<BackendType>::new(values.clone()).set_seed(7);
        let mut b = SliceData::<BackendType>::new(values).set_seed(7);
        assert_eq!(to_vec_f64(&a.sample(Some(10))), to_vec_f64(&b.sample(Some(10))));
    }
}
