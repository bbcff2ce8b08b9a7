use approx::assert_abs_diff_eq;
use burn::backend::{Autodiff, NdArray};
use burn::prelude::Backend;
use mini_vi::core::{RunConfig, VariationalInference};
use mini_vi::data::SliceData;
use mini_vi::map::{Laplace, MAP};
use mini_vi::model::GaussianMeanModel;

type BackendType = Autodiff<NdArray<f64>>;

/// 100 observations at 5.0 give the log joint `-0.5 Σᵢ (z - 5)²`, whose mode
/// is 5 and whose negative-log-joint curvature is exactly 100.
#[test]
fn test_laplace_on_the_gaussian_mean() {
    BackendType::seed(45);
    let data = SliceData::<BackendType>::new(vec![5.0; 100]).set_seed(45);

    let mut inference = Laplace::with_init(GaussianMeanModel, data, &[0.0]);
    inference
        .run(RunConfig {
            n_iter: 300,
            n_print: None,
            ..Default::default()
        })
        .unwrap();

    let mode = inference.mode()[0];
    assert!((mode - 5.0).abs() < 0.2, "expected mode near 5.0, got {mode}");

    let h = inference.precision().unwrap();
    assert_eq!(h.dim(), (1, 1));
    // The log joint is quadratic, so central differences are exact.
    assert_abs_diff_eq!(h[(0, 0)], 100.0, epsilon = 1e-3);
}

/// MAP alone finds the same mode without reporting any curvature.
#[test]
fn test_map_on_the_gaussian_mean() {
    BackendType::seed(46);
    let data = SliceData::<BackendType>::new(vec![5.0; 100]).set_seed(46);

    let mut inference = MAP::new(GaussianMeanModel, data);
    inference
        .run(RunConfig {
            n_iter: 300,
            n_print: None,
            ..Default::default()
        })
        .unwrap();

    let mode = inference.mode()[0];
    assert!((mode - 5.0).abs() < 0.2, "expected mode near 5.0, got {mode}");
}
