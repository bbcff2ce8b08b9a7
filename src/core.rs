//! The generic variational-inference optimize loop.
//!
//! Concrete algorithms ([`MFVI`](crate::mfvi::MFVI), [`KLpq`](crate::klpq::KLpq),
//! [`MAP`](crate::map::MAP), [`Laplace`](crate::map::Laplace)) plug into the
//! [`VariationalInference`] trait by exposing their family, loop state, and
//! per-iteration loss construction; the provided methods implement the shared
//! `initialize → update × (n_iter + 1) → finalize` protocol.

use crate::engine::{Adam, AdamConfig};
use crate::variational::VariationalFamily;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::fmt;

/// Configuration accepted by `initialize`/`run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Number of optimization iterations; the loop performs `n_iter + 1`
    /// updates.
    pub n_iter: usize,
    /// Mini-batch size for data subsampling; `None` uses all the data.
    pub n_data: Option<usize>,
    /// Print interval for progress output; `None` suppresses it.
    pub n_print: Option<usize>,
    /// Alternate optimizer settings. Mutually exclusive with `scope`.
    pub optimizer: Option<AdamConfig>,
    /// Restricts optimization to parameters whose name starts with this
    /// prefix.
    pub scope: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_iter: 1000,
            n_data: None,
            n_print: Some(100),
            optimizer: None,
            scope: None,
        }
    }
}

/// Errors surfaced while configuring an inference run.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// A configuration combination the engine does not support.
    UnsupportedConfig(String),
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceError::UnsupportedConfig(msg) => {
                write!(f, "unsupported configuration: {msg}")
            }
        }
    }
}

impl Error for InferenceError {}

/// One rebuilt stochastic objective.
pub struct LossTerms<B: AutodiffBackend> {
    /// Differentiable surrogate whose gradient w.r.t. the trainable
    /// parameters estimates the true objective's gradient. Minimized as-is.
    pub objective: Tensor<B, 1>,
    /// Reported loss value for this step; may differ from the surrogate,
    /// e.g. in sign.
    pub loss: f64,
}

/// Loop bookkeeping owned by every inference struct.
pub struct ViState<B: AutodiffBackend> {
    pub n_iter: usize,
    pub n_data: Option<usize>,
    pub n_print: Option<usize>,
    optimizer: Option<Adam<B>>,
    trainable: Vec<usize>,
}

impl<B: AutodiffBackend> ViState<B> {
    pub fn new() -> Self {
        Self {
            n_iter: 1000,
            n_data: None,
            n_print: Some(100),
            optimizer: None,
            trainable: Vec::new(),
        }
    }
}

impl<B: AutodiffBackend> Default for ViState<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether iteration `t` falls on a print boundary.
pub fn should_print(n_print: Option<usize>, t: usize) -> bool {
    match n_print {
        Some(k) if k > 0 => t % k == 0,
        _ => false,
    }
}

/// The optimize-loop protocol shared by all variational algorithms.
///
/// Single-threaded by construction: an `update` draws fresh samples, computes
/// one gradient, and applies it before the next iteration reads the
/// parameters back. `n_iter` is the sole termination condition.
pub trait VariationalInference<B: AutodiffBackend> {
    fn family(&self) -> &dyn VariationalFamily<B>;

    fn family_mut(&mut self) -> &mut dyn VariationalFamily<B>;

    fn vi_state(&self) -> &ViState<B>;

    fn vi_state_mut(&mut self) -> &mut ViState<B>;

    /// Rebuilds the stochastic objective from fresh samples of the data and
    /// the variational family.
    fn build_loss(&mut self) -> LossTerms<B>;

    /// Post-convergence hook; default is a no-op.
    fn finalize(&mut self) {}

    /// Short tag used as the progress-bar prefix.
    fn name(&self) -> &'static str {
        "VI"
    }

    /// Stores the run configuration, selects the trainable-parameter set,
    /// and sets up the optimizer.
    ///
    /// Fails with [`InferenceError::UnsupportedConfig`] if both an alternate
    /// optimizer and a parameter scope are given; nothing runnable is left
    /// behind in that case.
    fn initialize(&mut self, config: RunConfig) -> Result<(), InferenceError> {
        if config.optimizer.is_some() && config.scope.is_some() {
            return Err(InferenceError::UnsupportedConfig(
                "an alternate optimizer does not accept a parameter scope".to_string(),
            ));
        }
        let params = self.family().params();
        let names = self.family().param_names();
        let trainable: Vec<usize> = match &config.scope {
            Some(scope) => names
                .iter()
                .enumerate()
                .filter(|(_, name)| name.starts_with(scope.as_str()))
                .map(|(i, _)| i)
                .collect(),
            None => (0..params.len()).collect(),
        };
        let optimizer = Adam::new(config.optimizer.unwrap_or_default(), &params);
        let state = self.vi_state_mut();
        state.n_iter = config.n_iter;
        state.n_data = config.n_data;
        state.n_print = config.n_print;
        state.optimizer = Some(optimizer);
        state.trainable = trainable;
        Ok(())
    }

    /// Executes exactly one optimizer step and returns the loss observed for
    /// that step.
    fn update(&mut self) -> f64 {
        let terms = self.build_loss();
        let grads = terms.objective.backward();
        let params = self.family().params();
        let trainable = self.vi_state().trainable.clone();
        let stepped = self
            .vi_state_mut()
            .optimizer
            .as_mut()
            .expect("initialize must run before update")
            .step(params, &grads, &trainable);
        self.family_mut().set_params(stepped);
        terms.loss
    }

    /// Prints the iteration index, loss, and family summary on print
    /// boundaries; no-op otherwise.
    fn print_progress(&self, t: usize, loss: f64) {
        if should_print(self.vi_state().n_print, t) {
            println!("iter {t} loss {loss:.2}");
            println!("{}", self.family().describe());
        }
    }

    /// Runs the whole protocol: initialize, `n_iter + 1` updates each
    /// followed by progress printing, then finalize.
    fn run(&mut self, config: RunConfig) -> Result<(), InferenceError> {
        self.initialize(config)?;
        for t in 0..=self.vi_state().n_iter {
            let loss = self.update();
            self.print_progress(t, loss);
        }
        self.finalize();
        Ok(())
    }

    /// Like [`run`](Self::run), but drives an indicatif progress bar instead
    /// of interval printing.
    fn run_progress(&mut self, config: RunConfig) -> Result<(), InferenceError> {
        self.initialize(config)?;
        let n_iter = self.vi_state().n_iter;
        let pb = ProgressBar::new((n_iter + 1) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        pb.set_prefix(self.name());
        for _ in 0..=n_iter {
            let loss = self.update();
            pb.inc(1);
            pb.set_message(format!("loss≈{loss:.2}"));
        }
        pb.finish_with_message("Done!");
        self.finalize();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variational::PointMass;
    use burn::backend::{Autodiff, NdArray};

    type BackendType = Autodiff<NdArray<f64>>;

    /// Minimal plug-in that counts how often its loss is rebuilt.
    struct CountingInference {
        family: PointMass<BackendType>,
        state: ViState<BackendType>,
        builds: usize,
    }

    impl CountingInference {
        fn new() -> Self {
            Self {
                family: PointMass::new(1),
                state: ViState::new(),
                builds: 0,
            }
        }
    }

    impl VariationalInference<BackendType> for CountingInference {
        fn family(&self) -> &dyn VariationalFamily<BackendType> {
            &self.family
        }

        fn family_mut(&mut self) -> &mut dyn VariationalFamily<BackendType> {
            &mut self.family
        }

        fn vi_state(&self) -> &ViState<BackendType> {
            &self.state
        }

        fn vi_state_mut(&mut self) -> &mut ViState<BackendType> {
            &mut self.state
        }

        fn build_loss(&mut self) -> LossTerms<BackendType> {
            self.builds += 1;
            let objective = self.family.params().remove(0).powi_scalar(2).sum();
            LossTerms {
                objective,
                loss: 0.0,
            }
        }
    }

    #[test]
    fn test_run_performs_n_iter_plus_one_updates() {
        let mut inference = CountingInference::new();
        inference
            .run(RunConfig {
                n_iter: 7,
                n_print: None,
                ..RunConfig::default()
            })
            .unwrap();
        assert_eq!(inference.builds, 8);
    }

    #[test]
    fn test_print_gate() {
        assert!(should_print(Some(100), 0));
        assert!(should_print(Some(100), 100));
        assert!(should_print(Some(100), 200));
        assert!(!should_print(Some(100), 1));
        assert!(!should_print(Some(100), 99));
        for t in 0..=1000 {
            assert!(!should_print(None, t));
        }
    }

    #[test]
    fn test_optimizer_and_scope_are_mutually_exclusive() {
        let mut inference = CountingInference::new();
        let result = inference.initialize(RunConfig {
            optimizer: Some(AdamConfig::default()),
            scope: Some("point_mass".to_string()),
            ..RunConfig::default()
        });
        assert!(matches!(
            result,
            Err(InferenceError::UnsupportedConfig(_))
        ));
        // The failed initialize must leave nothing runnable behind.
        assert!(inference.state.optimizer.is_none());
    }

    #[test]
    fn test_scope_selects_matching_params() {
        let mut inference = CountingInference::new();
        inference
            .initialize(RunConfig {
                scope: Some("point_mass".to_string()),
                ..RunConfig::default()
            })
            .unwrap();
        assert_eq!(inference.state.trainable, vec![0]);

        inference
            .initialize(RunConfig {
                scope: Some("elsewhere".to_string()),
                ..RunConfig::default()
            })
            .unwrap();
        assert!(inference.state.trainable.is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.n_iter, 1000);
        assert_eq!(config.n_data, None);
        assert_eq!(config.n_print, Some(100));
        assert!(config.optimizer.is_none());
        assert!(config.scope.is_none());
    }

    #[test]
    fn test_update_moves_the_point_mass() {
        // Loss p² pulls the (initially zero) point nowhere, so seed it first.
        let mut inference = CountingInference::new();
        inference.family = PointMass::with_init(&[2.0]);
        inference.initialize(RunConfig::default()).unwrap();
        inference.update();
        let value = inference.family.values()[0];
        assert!(value < 2.0, "expected a descent step, got {value}");
    }
}
