//! Shared numeric helpers for variational objectives.

use burn::prelude::*;
use burn::tensor::cast::ToElement;

/// Numerically stable `log(sum(exp(x)))` over a 1D tensor.
///
/// Shifts by the maximum before exponentiating so that extreme log-weights
/// neither overflow nor underflow.
pub fn log_sum_exp<B: Backend>(x: Tensor<B, 1>) -> Tensor<B, 1> {
    let m = x.clone().max();
    (x - m.clone()).exp().sum().log() + m
}

/// Closed-form KL divergence `KL(N(loc, diag(scale²)) ‖ N(0, I))`,
/// computed elementwise over stacked location/scale vectors.
pub fn kl_multivariate_normal<B: Backend>(loc: Tensor<B, 1>, scale: Tensor<B, 1>) -> Tensor<B, 1> {
    let var = scale.powi_scalar(2);
    (var.clone() + loc.powi_scalar(2) - var.log())
        .sub_scalar(1.0)
        .sum()
        .mul_scalar(0.5)
}

/// Inverse of `softplus`: the raw value `r` with `ln(1 + e^r) = y`.
/// Requires `y > 0`.
pub fn softplus_inv(y: f64) -> f64 {
    (y.exp() - 1.0).ln()
}

/// Copies a 1D tensor into a host `Vec<f64>`.
pub fn to_vec_f64<B: Backend>(t: &Tensor<B, 1>) -> Vec<f64> {
    t.to_data()
        .as_slice::<B::FloatElem>()
        .expect("tensor data should match the backend float element")
        .iter()
        .map(|e| e.to_f64())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::backend::NdArray;

    type BackendType = NdArray<f64>;

    fn tensor(values: &[f64]) -> Tensor<BackendType, 1> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), [values.len()]),
            &Default::default(),
        )
    }

    #[test]
    fn test_log_sum_exp_matches_direct_computation() {
        let x = tensor(&[1.0, 2.0, 3.0]);
        let got = log_sum_exp(x).into_scalar();
        let expected = (1.0_f64.exp() + 2.0_f64.exp() + 3.0_f64.exp()).ln();
        assert_abs_diff_eq!(got, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_log_sum_exp_is_stable_for_large_inputs() {
        // A naive exp-then-log would overflow here.
        let x = tensor(&[1000.0, 1000.0]);
        let got = log_sum_exp(x).into_scalar();
        assert_abs_diff_eq!(got, 1000.0 + 2.0_f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn test_kl_standard_normal_is_zero() {
        let kl = kl_multivariate_normal(tensor(&[0.0, 0.0]), tensor(&[1.0, 1.0])).into_scalar();
        assert_abs_diff_eq!(kl, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kl_closed_form() {
        // 0.5 * (σ² + μ² − 1 − ln σ²) with μ = 1, σ = 2.
        let kl = kl_multivariate_normal(tensor(&[1.0]), tensor(&[2.0])).into_scalar();
        let expected = 0.5 * (4.0 + 1.0 - 1.0 - 4.0_f64.ln());
        assert_abs_diff_eq!(kl, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_softplus_inv_roundtrip() {
        for &y in &[0.1, 0.7, 1.0, 3.5] {
            let r = softplus_inv(y);
            assert_abs_diff_eq!(r.exp().ln_1p(), y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_to_vec_f64_roundtrip() {
        let values = vec![-1.5, 0.0, 2.25];
        assert_eq!(to_vec_f64(&tensor(&values)), values);
    }
}
