//! Variational families: mean-field Gaussians and point masses.
//!
//! A family owns its trainable parameter tensors and hands them to the
//! optimizer by name, so a run can restrict training to a named scope.

use crate::numeric::{softplus_inv, to_vec_f64};
use burn::prelude::*;
use burn::tensor::activation::softplus;
use burn::tensor::backend::AutodiffBackend;
use std::f64::consts::PI;

/// Closed set of family shapes the loss constructions dispatch over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyKind {
    /// Factorized Gaussian with per-layer location/scale parameters;
    /// eligible for closed-form KL terms.
    GaussianMeanField,
    /// Anything else; only Monte-Carlo objectives apply.
    General,
}

/// An approximating distribution over the latent variables.
///
/// The capability surface (`kind`, `is_reparam`) is fixed at construction and
/// never changes during inference.
pub trait VariationalFamily<B: AutodiffBackend> {
    /// Draws `n` latent samples, shape `[n, d]`. Reparameterized families
    /// keep the samples connected to their parameters.
    fn sample(&self, n: usize) -> Tensor<B, 2>;

    /// Log-density of each sample, shape `[n]`.
    fn log_prob(&self, z: &Tensor<B, 2>) -> Tensor<B, 1>;

    /// Analytic entropy, if available.
    fn entropy(&self) -> Option<Tensor<B, 1>> {
        None
    }

    /// Which closed family shape this is.
    fn kind(&self) -> FamilyKind {
        FamilyKind::General
    }

    /// Whether `sample` is differentiable w.r.t. the parameters.
    fn is_reparam(&self) -> bool;

    /// Total latent dimension `d`.
    fn num_latents(&self) -> usize;

    /// Trainable parameter tensors, in a stable order.
    fn params(&self) -> Vec<Tensor<B, 1>>;

    /// Names aligned with [`params`](Self::params), used for scope filtering.
    fn param_names(&self) -> Vec<String>;

    /// Installs updated parameter tensors, same order as `params`.
    fn set_params(&mut self, params: Vec<Tensor<B, 1>>);

    /// Stacked per-layer location and (positive) scale vectors, for families
    /// with Gaussian layers.
    fn loc_scale(&self) -> Option<(Tensor<B, 1>, Tensor<B, 1>)> {
        None
    }

    /// Human-readable summary of the current state, for progress output.
    fn describe(&self) -> String;
}

fn param_tensor<B: AutodiffBackend>(values: &[f64]) -> Tensor<B, 1> {
    let td: TensorData = TensorData::new(values.to_vec(), [values.len()]);
    Tensor::<B, 1>::from_data(td, &B::Device::default()).require_grad()
}

/// One mean-field Gaussian block with its own location and scale vectors.
///
/// The scale is stored through a softplus parameterization so that it stays
/// positive under unconstrained gradient updates.
#[derive(Debug, Clone)]
pub struct GaussianLayer<B: AutodiffBackend> {
    loc: Tensor<B, 1>,
    raw_scale: Tensor<B, 1>,
}

impl<B: AutodiffBackend> GaussianLayer<B> {
    fn new(loc: &[f64], scale: &[f64]) -> Self {
        assert_eq!(loc.len(), scale.len());
        let raw: Vec<f64> = scale.iter().map(|&s| softplus_inv(s)).collect();
        Self {
            loc: param_tensor(loc),
            raw_scale: param_tensor(&raw),
        }
    }

    pub fn loc(&self) -> Tensor<B, 1> {
        self.loc.clone()
    }

    pub fn scale(&self) -> Tensor<B, 1> {
        softplus(self.raw_scale.clone(), 1.0)
    }

    fn width(&self) -> usize {
        self.loc.dims()[0]
    }
}

/// A fully factorized Gaussian `q(z) = Π_k N(z_k; μ_k, σ_k²)` over one or
/// more layers, with reparameterized sampling.
#[derive(Debug, Clone)]
pub struct MeanFieldGaussian<B: AutodiffBackend> {
    layers: Vec<GaussianLayer<B>>,
}

impl<B: AutodiffBackend> MeanFieldGaussian<B> {
    /// Creates a single layer of `d` standard-normal factors.
    pub fn new(d: usize) -> Self {
        Self::with_init(&vec![0.0; d], &vec![1.0; d])
    }

    /// Creates a single layer with explicit location and scale values.
    pub fn with_init(loc: &[f64], scale: &[f64]) -> Self {
        Self {
            layers: vec![GaussianLayer::new(loc, scale)],
        }
    }

    /// Appends another independent layer of factors.
    pub fn add_layer(mut self, loc: &[f64], scale: &[f64]) -> Self {
        self.layers.push(GaussianLayer::new(loc, scale));
        self
    }

    pub fn layers(&self) -> &[GaussianLayer<B>] {
        &self.layers
    }

    /// Current location values across all layers.
    pub fn loc_values(&self) -> Vec<f64> {
        to_vec_f64(&self.loc())
    }

    /// Current scale values across all layers.
    pub fn scale_values(&self) -> Vec<f64> {
        to_vec_f64(&self.scale())
    }

    fn loc(&self) -> Tensor<B, 1> {
        Tensor::cat(self.layers.iter().map(|l| l.loc()).collect(), 0)
    }

    fn scale(&self) -> Tensor<B, 1> {
        Tensor::cat(self.layers.iter().map(|l| l.scale()).collect(), 0)
    }
}

impl<B: AutodiffBackend> VariationalFamily<B> for MeanFieldGaussian<B> {
    fn sample(&self, n: usize) -> Tensor<B, 2> {
        let d = self.num_latents();
        let eps = Tensor::<B, 2>::random(
            Shape::new([n, d]),
            burn::tensor::Distribution::Normal(0., 1.),
            &B::Device::default(),
        );
        let loc: Tensor<B, 2> = self.loc().unsqueeze_dim(0);
        let scale: Tensor<B, 2> = self.scale().unsqueeze_dim(0);
        eps * scale + loc
    }

    fn log_prob(&self, z: &Tensor<B, 2>) -> Tensor<B, 1> {
        let loc: Tensor<B, 2> = self.loc().unsqueeze_dim(0);
        let scale: Tensor<B, 2> = self.scale().unsqueeze_dim(0);
        let normed = (z.clone() - loc) / scale.clone();
        let per_dim = normed
            .powi_scalar(2)
            .mul_scalar(0.5)
            .add(scale.log())
            .add_scalar(0.5 * (2.0 * PI).ln());
        let summed: Tensor<B, 1> = per_dim.sum_dim(1).squeeze(1);
        -summed
    }

    fn entropy(&self) -> Option<Tensor<B, 1>> {
        let log_scale = self.scale().log();
        Some(log_scale.add_scalar(0.5 * (1.0 + (2.0 * PI).ln())).sum())
    }

    fn kind(&self) -> FamilyKind {
        FamilyKind::GaussianMeanField
    }

    fn is_reparam(&self) -> bool {
        true
    }

    fn num_latents(&self) -> usize {
        self.layers.iter().map(|l| l.width()).sum()
    }

    fn params(&self) -> Vec<Tensor<B, 1>> {
        self.layers
            .iter()
            .flat_map(|l| [l.loc.clone(), l.raw_scale.clone()])
            .collect()
    }

    fn param_names(&self) -> Vec<String> {
        (0..self.layers.len())
            .flat_map(|i| [format!("q/loc{i}"), format!("q/scale{i}")])
            .collect()
    }

    fn set_params(&mut self, params: Vec<Tensor<B, 1>>) {
        assert_eq!(params.len(), 2 * self.layers.len());
        for (layer, pair) in self.layers.iter_mut().zip(params.chunks_exact(2)) {
            layer.loc = pair[0].clone();
            layer.raw_scale = pair[1].clone();
        }
    }

    fn loc_scale(&self) -> Option<(Tensor<B, 1>, Tensor<B, 1>)> {
        Some((self.loc(), self.scale()))
    }

    fn describe(&self) -> String {
        format!(
            "mean-field normal: loc {:.3?} scale {:.3?}",
            self.loc_values(),
            self.scale_values()
        )
    }
}

/// Degenerate distribution putting all mass on a single trainable point,
/// used for posterior-mode estimation.
#[derive(Debug, Clone)]
pub struct PointMass<B: AutodiffBackend> {
    value: Option<Tensor<B, 1>>,
    name: String,
}

impl<B: AutodiffBackend> PointMass<B> {
    /// A point mass with `d` free parameters initialized at zero.
    pub fn new(d: usize) -> Self {
        Self::with_init(&vec![0.0; d])
    }

    /// A point mass seeded with explicit initial values.
    pub fn with_init(values: &[f64]) -> Self {
        let value = if values.is_empty() {
            None
        } else {
            Some(param_tensor(values))
        };
        Self {
            value,
            name: "point_mass".to_string(),
        }
    }

    /// Places the parameter under `scope/`, so it can be isolated later.
    pub fn scoped(mut self, scope: &str) -> Self {
        self.name = format!("{scope}/point_mass");
        self
    }

    /// Current point estimate.
    pub fn values(&self) -> Vec<f64> {
        self.value.as_ref().map(to_vec_f64).unwrap_or_default()
    }
}

impl<B: AutodiffBackend> VariationalFamily<B> for PointMass<B> {
    fn sample(&self, n: usize) -> Tensor<B, 2> {
        match &self.value {
            Some(v) => {
                let point: Tensor<B, 2> = v.clone().unsqueeze_dim(0);
                if n > 1 {
                    point.repeat_dim(0, n)
                } else {
                    point
                }
            }
            None => Tensor::zeros(Shape::new([n, 0]), &B::Device::default()),
        }
    }

    fn log_prob(&self, z: &Tensor<B, 2>) -> Tensor<B, 1> {
        Tensor::zeros(Shape::new([z.dims()[0]]), &z.device())
    }

    fn is_reparam(&self) -> bool {
        true
    }

    fn num_latents(&self) -> usize {
        self.value.as_ref().map(|v| v.dims()[0]).unwrap_or(0)
    }

    fn params(&self) -> Vec<Tensor<B, 1>> {
        self.value.iter().cloned().collect()
    }

    fn param_names(&self) -> Vec<String> {
        self.value.iter().map(|_| self.name.clone()).collect()
    }

    fn set_params(&mut self, params: Vec<Tensor<B, 1>>) {
        if let Some(p) = params.into_iter().next() {
            self.value = Some(p);
        }
    }

    fn describe(&self) -> String {
        format!("point mass: {:.3?}", self.values())
    }
}
