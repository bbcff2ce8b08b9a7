use burn::backend::Autodiff;
use burn::prelude::Backend;
use mini_vi::core::{RunConfig, VariationalInference};
use mini_vi::data::SliceData;
use mini_vi::mfvi::MFVI;
use mini_vi::model::GaussianMeanModel;
use mini_vi::variational::{MeanFieldGaussian, VariationalFamily};

fn main() {
    // Use the CPU backend (NdArray) wrapped in Autodiff.
    type BackendType = Autodiff<burn::backend::NdArray<f64>>;
    BackendType::seed(42);

    // 100 observations at 5.0; the posterior over the mean concentrates
    // tightly around 5.
    let data = SliceData::<BackendType>::new(vec![5.0; 100]).set_seed(42);

    // Standard-normal starting point for the variational family.
    let q = MeanFieldGaussian::new(1);

    let mut inference = MFVI::new(GaussianMeanModel, data, q).n_minibatch(8);
    inference
        .run_progress(RunConfig {
            n_iter: 200,
            n_print: None,
            ..Default::default()
        })
        .unwrap_or_else(|e| panic!("inference failed: {e}"));

    println!("Fitted {}", inference.variational().describe());
    let loc = inference.variational().loc_values()[0];
    let scale = inference.variational().scale_values()[0];
    println!("loc ≈ {loc:.3}, scale ≈ {scale:.3}");
}
