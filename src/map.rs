//! Maximum a posteriori estimation and its Laplace refinement.
//!
//! Both fit a [`PointMass`] family by gradient ascent on the log joint;
//! [`Laplace`] additionally reports the curvature of the negative log joint
//! at the fitted mode, i.e. the precision matrix of the Gaussian
//! approximation around it.

use crate::core::{LossTerms, VariationalInference, ViState};
use crate::data::DataSource;
use crate::engine::hessian;
use crate::model::LatentModel;
use crate::variational::{PointMass, VariationalFamily};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::cast::ToElement;
use ndarray::Array2;

/// One gradient step's objective for posterior-mode estimation: the negative
/// log joint at the current point.
fn map_loss<B, M, D>(
    model: &M,
    data: &mut D,
    variational: &PointMass<B>,
    n_data: Option<usize>,
) -> LossTerms<B>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
{
    let x = data.sample(n_data);
    let z = variational.sample(1);
    let log_p = model.log_prob(&x, &z).mean();
    let loss = log_p.clone().into_scalar().to_f64();
    LossTerms {
        objective: -log_p,
        loss,
    }
}

/// Posterior-mode estimation with a trainable point mass.
pub struct MAP<B, M, D>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
{
    model: M,
    data: D,
    variational: PointMass<B>,
    state: ViState<B>,
}

impl<B, M, D> MAP<B, M, D>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
{
    /// Starts the point mass at zero with the model's latent dimension.
    pub fn new(model: M, data: D) -> Self {
        let variational = PointMass::new(model.num_latents());
        Self {
            model,
            data,
            variational,
            state: ViState::new(),
        }
    }

    /// Starts the point mass at explicit initial values.
    pub fn with_init(model: M, data: D, init: &[f64]) -> Self {
        Self {
            model,
            data,
            variational: PointMass::with_init(init),
            state: ViState::new(),
        }
    }

    /// The fitted mode.
    pub fn mode(&self) -> Vec<f64> {
        self.variational.values()
    }
}

impl<B, M, D> VariationalInference<B> for MAP<B, M, D>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
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
        "MAP"
    }

    fn build_loss(&mut self) -> LossTerms<B> {
        map_loss(&self.model, &mut self.data, &self.variational, self.state.n_data)
    }
}

/// MAP estimation followed by a Gaussian curvature approximation at the mode.
///
/// After the optimize loop, `finalize` evaluates the Hessian of the negative
/// log joint at the fitted point and stores it as the precision matrix.
pub struct Laplace<B, M, D>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
{
    model: M,
    data: D,
    variational: PointMass<B>,
    state: ViState<B>,
    precision: Option<Array2<f64>>,
}

impl<B, M, D> Laplace<B, M, D>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
{
    pub fn new(model: M, data: D) -> Self {
        let variational = PointMass::new(model.num_latents()).scoped("variational");
        Self {
            model,
            data,
            variational,
            state: ViState::new(),
            precision: None,
        }
    }

    pub fn with_init(model: M, data: D, init: &[f64]) -> Self {
        Self {
            model,
            data,
            variational: PointMass::with_init(init).scoped("variational"),
            state: ViState::new(),
            precision: None,
        }
    }

    pub fn mode(&self) -> Vec<f64> {
        self.variational.values()
    }

    /// Precision matrix of the Gaussian approximation; `None` before
    /// `finalize` has run.
    pub fn precision(&self) -> Option<&Array2<f64>> {
        self.precision.as_ref()
    }
}

impl<B, M, D> VariationalInference<B> for Laplace<B, M, D>
where
    B: AutodiffBackend,
    M: LatentModel<B>,
    D: DataSource<B>,
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
        "Laplace"
    }

    fn build_loss(&mut self) -> LossTerms<B> {
        map_loss(&self.model, &mut self.data, &self.variational, self.state.n_data)
    }

    fn finalize(&mut self) {
        let mode = match self.variational.params().into_iter().next() {
            Some(p) => p.detach(),
            None => {
                self.precision = Some(Array2::zeros((0, 0)));
                return;
            }
        };
        let x = self.data.sample(self.state.n_data);
        let model = &self.model;
        let h = hessian(
            |theta| {
                let z: Tensor<B, 2> = theta.unsqueeze_dim(0);
                -model.log_prob(&x, &z).mean()
            },
            &mode,
        );
        println!("Precision matrix:");
        println!("{h}");
        self.precision = Some(h);
    }
}
