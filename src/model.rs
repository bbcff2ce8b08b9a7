//! Probability models consumed by the inference algorithms.
//!
//! A model evaluates the log-joint `log p(x, z)` over observed data `x` and a
//! batch of latent samples `z`. Models that factor into a likelihood against
//! a standard-normal prior can additionally expose `log_lik`, which unlocks
//! the analytic-KL objectives in [`crate::mfvi`].

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// A probability model over observed data `x` and latent variables `z`.
///
/// # Type Parameters
///
/// * `B`: The autodiff backend from the `burn` crate.
pub trait LatentModel<B: AutodiffBackend> {
    /// Log-joint `log p(x, z)` for each latent sample.
    ///
    /// `x` has shape `[m]`, `z` has shape `[n, d]`, and the result has shape
    /// `[n]`. Must be differentiable w.r.t. `z` for reparameterized
    /// estimators; score-function estimators only need the value.
    fn log_prob(&self, x: &Tensor<B, 1>, z: &Tensor<B, 2>) -> Tensor<B, 1>;

    /// Log-likelihood `log p(x | z)`, for models that factor against a
    /// standard-normal prior on `z`.
    fn log_lik(&self, x: &Tensor<B, 1>, z: &Tensor<B, 2>) -> Option<Tensor<B, 1>> {
        let _ = (x, z);
        None
    }

    /// Whether [`log_lik`](Self::log_lik) is available.
    fn has_log_lik(&self) -> bool {
        false
    }

    /// Number of latent dimensions the model declares (0 if none).
    fn num_latents(&self) -> usize {
        0
    }
}

/// Per-sample squared-error log-likelihood `Σ_i -0.5 (z - x_i)²` for a
/// single latent location parameter.
fn gaussian_loc_ll<B: AutodiffBackend>(x: &Tensor<B, 1>, z: &Tensor<B, 2>) -> Tensor<B, 1> {
    let n = z.dims()[0];
    let m = x.dims()[0];
    let x_row: Tensor<B, 2> = x.clone().unsqueeze_dim(0);
    let diff = z.clone().expand([n, m]) - x_row;
    let lp: Tensor<B, 1> = diff.powi_scalar(2).mul_scalar(0.5).sum_dim(1).squeeze(1);
    -lp
}

/// Gaussian location model with a flat prior:
/// `log p(x, z) = Σ_i -0.5 (z - x_i)²` over one latent mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianMeanModel;

impl<B: AutodiffBackend> LatentModel<B> for GaussianMeanModel {
    fn log_prob(&self, x: &Tensor<B, 1>, z: &Tensor<B, 2>) -> Tensor<B, 1> {
        gaussian_loc_ll(x, z)
    }

    fn num_latents(&self) -> usize {
        1
    }
}

/// Gaussian location model with a standard-normal prior on the latent mean,
/// exposing the likelihood/prior split needed for analytic-KL objectives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConjugateGaussianModel;

impl<B: AutodiffBackend> LatentModel<B> for ConjugateGaussianModel {
    fn log_prob(&self, x: &Tensor<B, 1>, z: &Tensor<B, 2>) -> Tensor<B, 1> {
        let prior: Tensor<B, 1> = z.clone().powi_scalar(2).mul_scalar(0.5).sum_dim(1).squeeze(1);
        gaussian_loc_ll(x, z) - prior
    }

    fn log_lik(&self, x: &Tensor<B, 1>, z: &Tensor<B, 2>) -> Option<Tensor<B, 1>> {
        Some(gaussian_loc_ll(x, z))
    }

    fn has_log_lik(&self) -> bool {
        true
    }

    fn num_latents(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::backend::{Autodiff, NdArray};

    type BackendType = Autodiff<NdArray<f64>>;

    fn tensor1(values: &[f64]) -> Tensor<BackendType, 1> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), [values.len()]),
            &Default::default(),
        )
    }

    fn tensor2(values: &[f64], shape: [usize; 2]) -> Tensor<BackendType, 2> {
        Tensor::from_data(TensorData::new(values.to_vec(), shape), &Default::default())
    }

    #[test]
    fn test_gaussian_mean_log_prob() {
        let x = tensor1(&[1.0, 3.0]);
        let z = tensor2(&[2.0], [1, 1]);
        let lp = LatentModel::log_prob(&GaussianMeanModel, &x, &z).into_scalar();
        assert_abs_diff_eq!(lp, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gaussian_mean_batched_samples() {
        let x = tensor1(&[0.0]);
        let z = tensor2(&[0.0, 1.0, 2.0], [3, 1]);
        let lp = LatentModel::log_prob(&GaussianMeanModel, &x, &z);
        let expected = [0.0, -0.5, -2.0];
        for (got, want) in crate::numeric::to_vec_f64(&lp).into_iter().zip(expected) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_conjugate_model_splits_into_lik_and_prior() {
        let model = ConjugateGaussianModel;
        let x = tensor1(&[1.0]);
        let z = tensor2(&[2.0], [1, 1]);
        let lik = model.log_lik(&x, &z).unwrap().into_scalar();
        let joint = LatentModel::<BackendType>::log_prob(&model, &x, &z).into_scalar();
        assert_abs_diff_eq!(lik, -0.5, epsilon = 1e-12);
        // joint = lik + standard-normal prior at z = 2.
        assert_abs_diff_eq!(joint, -0.5 - 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_capability_flags() {
        assert!(!LatentModel::<BackendType>::has_log_lik(&GaussianMeanModel));
        assert!(LatentModel::<BackendType>::has_log_lik(
            &ConjugateGaussianModel
        ));
        assert_eq!(LatentModel::<BackendType>::num_latents(&GaussianMeanModel), 1);
    }
}
