//! Mean-field / black-box variational inference.
//!
//! Maximizes the evidence lower bound
//! `ELBO = E_q[log p(x, z) - log q(z)]`
//! with either score-function (REINFORCE) or reparameterization gradients.
//! When the family is a mean-field Gaussian and the model exposes a
//! likelihood/prior split, the KL term against the standard-normal prior is
//! evaluated in closed form and only the likelihood term is estimated by
//! Monte Carlo.

use crate::core::{LossTerms, VariationalInference, ViState};
use crate::data::DataSource;
use crate::model::LatentModel;
use crate::numeric::kl_multivariate_normal;
use crate::variational::{FamilyKind, VariationalFamily};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::cast::ToElement;

/// Gradient estimator backing the ELBO objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimator {
    /// Score-function (REINFORCE) gradients; valid even when the model's
    /// log-density is not differentiable in `z`.
    Score,
    /// Pathwise gradients through a differentiable sampling transform.
    Reparam,
}

/// Black-box variational inference over a model, data source, and family.
pub struct MFVI<B, M, D, Q>
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
    score: Option<bool>,
}

impl<B, M, D, Q> MFVI<B, M, D, Q>
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
            score: None,
        }
    }

    /// Number of latent samples per stochastic-gradient step.
    pub fn n_minibatch(mut self, n: usize) -> Self {
        self.n_minibatch = n;
        self
    }

    /// Forces the score-function estimator (`true`) or the reparameterization
    /// estimator (`false`). The default picks reparameterization whenever the
    /// family supports it.
    pub fn use_score_estimator(mut self, score: bool) -> Self {
        self.score = Some(score);
        self
    }

    /// The gradient estimator in effect.
    pub fn estimator(&self) -> Estimator {
        match self.score {
            Some(true) => Estimator::Score,
            Some(false) => Estimator::Reparam,
            None => {
                if self.variational.is_reparam() {
                    Estimator::Reparam
                } else {
                    Estimator::Score
                }
            }
        }
    }

    pub fn variational(&self) -> &Q {
        &self.variational
    }

    /// Score-function estimator of the negative ELBO. The latent sample and
    /// the log-weight multiplier are frozen; gradients reach the parameters
    /// only through the explicit `log q(z)` factor.
    fn score_loss(&mut self) -> LossTerms<B> {
        let x = self.data.sample(self.state.n_data);
        let z = self.variational.sample(self.n_minibatch).detach();
        let q_log_prob = self.variational.log_prob(&z);
        let log_w = self.model.log_prob(&x, &z) - q_log_prob.clone();
        let loss = log_w.clone().mean().into_scalar().to_f64();
        let objective = -(q_log_prob * log_w.detach()).mean();
        LossTerms { objective, loss }
    }

    /// Pathwise estimator of the negative ELBO; gradients flow through the
    /// reparameterized sample itself.
    fn reparam_loss(&mut self) -> LossTerms<B> {
        let x = self.data.sample(self.state.n_data);
        let z = self.variational.sample(self.n_minibatch);
        let elbo = (self.model.log_prob(&x, &z) - self.variational.log_prob(&z)).mean();
        let loss = elbo.clone().into_scalar().to_f64();
        LossTerms {
            objective: -elbo,
            loss,
        }
    }

    /// Score-function estimator with the prior KL in closed form. The KL term
    /// stays in the graph and contributes exact gradients; only the
    /// likelihood term uses the score-function trick.
    fn score_loss_kl(&mut self) -> LossTerms<B> {
        let x = self.data.sample(self.state.n_data);
        let z = self.variational.sample(self.n_minibatch).detach();
        let q_log_prob = self.variational.log_prob(&z);
        let log_lik = self
            .model
            .log_lik(&x, &z)
            .expect("analytic-KL objective requires a model with log_lik");
        let (loc, scale) = self
            .variational
            .loc_scale()
            .expect("analytic-KL objective requires Gaussian layers");
        let kl = kl_multivariate_normal(loc, scale);
        let loss = (log_lik.clone().mean() - kl.clone()).into_scalar().to_f64();
        let objective = -((q_log_prob * log_lik.detach()).mean() - kl);
        LossTerms { objective, loss }
    }

    /// Pathwise estimator with the prior KL in closed form.
    fn reparam_loss_kl(&mut self) -> LossTerms<B> {
        let x = self.data.sample(self.state.n_data);
        let z = self.variational.sample(self.n_minibatch);
        let log_lik = self
            .model
            .log_lik(&x, &z)
            .expect("analytic-KL objective requires a model with log_lik");
        let (loc, scale) = self
            .variational
            .loc_scale()
            .expect("analytic-KL objective requires Gaussian layers");
        let bound = log_lik.mean() - kl_multivariate_normal(loc, scale);
        let loss = bound.clone().into_scalar().to_f64();
        LossTerms {
            objective: -bound,
            loss,
        }
    }
}

impl<B, M, D, Q> VariationalInference<B> for MFVI<B, M, D, Q>
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
        "MFVI"
    }

    fn build_loss(&mut self) -> LossTerms<B> {
        let analytic =
            self.variational.kind() == FamilyKind::GaussianMeanField && self.model.has_log_lik();
        match (self.estimator(), analytic) {
            (Estimator::Score, true) => self.score_loss_kl(),
            (Estimator::Score, false) => self.score_loss(),
            (Estimator::Reparam, true) => self.reparam_loss_kl(),
            (Estimator::Reparam, false) => self.reparam_loss(),
        }
    }
}
