//! Gradient-descent machinery: an Adam optimizer with staircase learning-rate
//! decay, and a finite-difference Hessian for post-hoc curvature.

use crate::numeric::to_vec_f64;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use ndarray::Array2;

/// Adam hyperparameters. The default schedule starts at 0.1 and decays the
/// learning rate by 0.9 every 100 steps (staircase).
#[derive(Debug, Clone, PartialEq)]
pub struct AdamConfig {
    pub learning_rate: f64,
    pub decay_rate: f64,
    pub decay_every: usize,
    pub beta_1: f64,
    pub beta_2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            decay_rate: 0.9,
            decay_every: 100,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Adam over a flat list of 1D parameter tensors.
///
/// Moment estimates live on the inner (non-autodiff) backend; each `step`
/// consumes the autodiff gradients of one scalar loss.
#[derive(Debug, Clone)]
pub struct Adam<B: AutodiffBackend> {
    config: AdamConfig,
    step: usize,
    moment_1: Vec<Tensor<B::InnerBackend, 1>>,
    moment_2: Vec<Tensor<B::InnerBackend, 1>>,
}

impl<B: AutodiffBackend> Adam<B> {
    pub fn new(config: AdamConfig, params: &[Tensor<B, 1>]) -> Self {
        let moment_1 = params
            .iter()
            .map(|p| p.clone().inner().zeros_like())
            .collect();
        let moment_2 = params
            .iter()
            .map(|p| p.clone().inner().zeros_like())
            .collect();
        Self {
            config,
            step: 0,
            moment_1,
            moment_2,
        }
    }

    /// Learning rate for the upcoming step.
    pub fn learning_rate(&self) -> f64 {
        let k = (self.step / self.config.decay_every) as i32;
        self.config.learning_rate * self.config.decay_rate.powi(k)
    }

    pub fn steps_taken(&self) -> usize {
        self.step
    }

    /// Applies one update to `params[i]` for each trainable index `i`,
    /// returning the full parameter list with stepped entries replaced.
    /// Parameters without a gradient pass through unchanged.
    pub fn step(
        &mut self,
        mut params: Vec<Tensor<B, 1>>,
        grads: &B::Gradients,
        trainable: &[usize],
    ) -> Vec<Tensor<B, 1>> {
        let lr = self.learning_rate();
        self.step += 1;
        let t = self.step as i32;
        let bias_1 = 1.0 - self.config.beta_1.powi(t);
        let bias_2 = 1.0 - self.config.beta_2.powi(t);
        for &i in trainable {
            let grad = match params[i].grad(grads) {
                Some(g) => g,
                None => continue,
            };
            self.moment_1[i] = self.moment_1[i]
                .clone()
                .mul_scalar(self.config.beta_1)
                .add(grad.clone().mul_scalar(1.0 - self.config.beta_1));
            self.moment_2[i] = self.moment_2[i]
                .clone()
                .mul_scalar(self.config.beta_2)
                .add(grad.powi_scalar(2).mul_scalar(1.0 - self.config.beta_2));
            let m_hat = self.moment_1[i].clone().div_scalar(bias_1);
            let v_hat = self.moment_2[i].clone().div_scalar(bias_2);
            let update = m_hat
                .mul_scalar(lr)
                .div(v_hat.sqrt().add_scalar(self.config.epsilon));
            params[i] = Tensor::from_inner(params[i].clone().inner().sub(update)).require_grad();
        }
        params
    }
}

/// Central finite-difference Hessian of the scalar function `f` at `at`,
/// built from first-order autodiff gradients.
///
/// Symmetrized as `(H + Hᵀ) / 2`, since the numeric Hessian of a smooth
/// scalar can come out slightly asymmetric.
pub fn hessian<B, F>(f: F, at: &Tensor<B, 1>) -> Array2<f64>
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 1>) -> Tensor<B, 1>,
{
    let theta = to_vec_f64(at);
    let d = theta.len();
    let mut h = Array2::<f64>::zeros((d, d));
    for j in 0..d {
        let eps = 1e-4 * theta[j].abs().max(1.0);

        let mut plus = theta.clone();
        plus[j] += eps;
        let grad_plus = grad_at(&f, &plus);

        let mut minus = theta.clone();
        minus[j] -= eps;
        let grad_minus = grad_at(&f, &minus);

        for i in 0..d {
            h[(i, j)] = (grad_plus[i] - grad_minus[i]) / (2.0 * eps);
        }
    }
    let ht = h.t().to_owned();
    (h + ht) * 0.5
}

fn grad_at<B, F>(f: &F, theta: &[f64]) -> Vec<f64>
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 1>) -> Tensor<B, 1>,
{
    let td: TensorData = TensorData::new(theta.to_vec(), [theta.len()]);
    let x = Tensor::<B, 1>::from_data(td, &B::Device::default()).require_grad();
    let grads = f(x.clone()).backward();
    let grad = x
        .grad(&grads)
        .expect("scalar should depend on the evaluation point");
    to_vec_f64(&grad)
}
