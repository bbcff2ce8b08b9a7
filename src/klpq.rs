//! Inclusive-KL variational inference.
//!
//! Minimizes `KL(p ‖ q)` instead of the exclusive `KL(q ‖ p)` that the ELBO
//! targets. The expectation under `p` is rewritten as a self-normalized
//! importance-sampling estimate with proposal `q`, which tends to produce
//! mass-covering rather than mode-seeking fits.

use crate::core::{LossTerms, VariationalInference, ViState};
use crate::data::DataSource;
use crate::model::LatentModel;
use crate::numeric::log_sum_exp;
use crate::variational::VariationalFamily;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::cast::ToElement;

/// Importance-weighted inference toward the inclusive KL divergence.
pub struct KLpq<B, M, D, Q>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
    Q: VariationalFamily<B>,
{
    model: M,
    data: D,
    variational: Q,
    state: ViState<B>,
    n_minibatch: usize,
}

impl<B, M, D, Q> KLpq<B, M, D, Q>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
    Q: VariationalFamily<B>,
{
    pub fn new(model: M, data: D, variational: Q) -> Self {
        Self {
            model,
            data,
            variational,
            state: ViState::new(),
            n_minibatch: 1,
        }
    }

    /// Number of importance samples per stochastic-gradient step.
    pub fn n_minibatch(mut self, n: usize) -> Self {
        self.n_minibatch = n;
        self
    }

    pub fn variational(&self) -> &Q {
        &self.variational
    }
}

impl<B, M, D, Q> VariationalInference<B> for KLpq<B, M, D, Q>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
    Q: VariationalFamily<B>,
{
    fn family(&self) -> &dyn VariationalFamily<B> {
        &self.variational
    }

    fn family_mut(&mut self) -> &mut dyn VariationalFamily<B> {
        &mut self.variational
    }

    fn vi_state(&self) -> &ViState<B> {
        &self.state
    }

    fn vi_state_mut(&mut self) -> &mut ViState<B> {
        &mut self.state
    }

    fn name(&self) -> &'static str {
        "KLpq"
    }

    /// Self-normalized importance-sampling surrogate. Both the samples and
    /// the normalized weights are frozen; gradients reach the parameters
    /// through the `log q(z)` factor only, which is the score-function
    /// estimate of the inclusive-KL gradient.
    fn build_loss(&mut self) -> LossTerms<B> {
        let x = self.data.sample(self.state.n_data);
        let z = self.variational.sample(self.n_minibatch).detach();
        let q_log_prob = self.variational.log_prob(&z);
        let log_w = self.model.log_prob(&x, &z) - q_log_prob.clone().detach();
        let log_w_norm = log_w.clone() - log_sum_exp(log_w.clone());
        let w_norm = log_w_norm.exp();
        let loss = (w_norm.clone() * log_w)
            .mean()
            .into_scalar()
            .to_f64();
        let objective = -(q_log_prob * w_norm.detach()).mean();
        LossTerms { objective, loss }
    }
}
