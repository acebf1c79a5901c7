use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{ensure, Context, Result};
use burn::{
    config::Config,
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use image::DynamicImage;
use kitvae_model::{Vae, VaeBatch, VaeConfig, VaeLoss, VaeLossConfig};
use kitvae_tracking::{
    ActiveRun, ExperimentTracker, ModelSignature, ModelVersion, RunInfo, TrackingBackend,
};
use kitvae_train::{DatasetSplits, ImageBatcher, ImageFolderDataset, ImageItem};
use kitvae_util::image::{save_image, tensor_to_rgb_images};
use tracing::{info, warn};

use crate::{
    backend::burn_backend_types::{InferenceDevice, TrainBackend, NAME},
    plots::{captioned_comparison, render_loss_chart},
};

/// Directory inside the run's artifacts holding the packaged model.
pub const BUNDLE_DIR: &str = "vae_bundle";

const RGB_CHANNELS: usize = 3;
const CHART_WIDTH: u32 = 800;
const CHART_HEIGHT: u32 = 500;

/// Everything one training run needs.
///
/// Loaded from a JSON file via [`TrainingConfig::load`] and saved next to the
/// trained weights.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "VaeConfig::new()")]
    pub model: VaeConfig,

    #[config(default = "VaeLossConfig::new()")]
    pub loss: VaeLossConfig,

    /// Directory of letterboxed training images.
    #[config(default = "String::from(\"data/interim\")")]
    pub data_dir: String,

    /// Scratch directory for plots and the model bundle before upload.
    #[config(default = "String::from(\"artifacts\")")]
    pub output_dir: String,

    #[config(default = 5)]
    pub num_epochs: usize,

    #[config(default = 8)]
    pub batch_size: usize,

    #[config(default = 1e-3)]
    pub learning_rate: f64,

    /// Trailing fraction of the training part used for validation.
    #[config(default = 0.1)]
    pub validation_split: f64,

    /// Trailing fraction of all images held out for the final test score.
    #[config(default = 0.2)]
    pub test_split: f64,

    /// Random seed for weight init, sampling noise and batch order.
    #[config(default = 42)]
    pub seed: u64,

    /// Number of test images shown in the reconstruction comparison.
    #[config(default = 5)]
    pub comparison_samples: usize,

    #[config(default = "String::from(\"image_generation_models\")")]
    pub registered_model_name: String,
}

impl TrainingConfig {
    /// Loads a training configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Saves this configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }
}

/// Per-epoch losses, each averaged over the images of the epoch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LossHistory {
    pub train: Vec<f64>,
    /// Empty when the validation split is empty.
    pub validation: Vec<f64>,
    /// KL divergence on the training split, reported even when unweighted.
    pub kl: Vec<f64>,
}

impl LossHistory {
    pub fn epochs(&self) -> usize {
        self.train.len()
    }
}

#[derive(Debug)]
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: Vae<B>,
    pub history: LossHistory,
}

/// Summary of a tracked training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub run: RunInfo,
    pub history: LossHistory,
    pub test_mse: f64,
    pub model_version: ModelVersion,
}

/// Trains `model` on the training split for `config.num_epochs` epochs.
///
/// The training loader reshuffles every epoch from `config.seed`. After each
/// epoch the validation split, if any, is scored with the same loss on the
/// inner backend.
///
/// # Errors
///
/// Returns an error if the batch size is zero, the training split is empty,
/// or the images do not match the model's input shape.
pub fn train<B: AutodiffBackend>(
    model: Vae<B>,
    splits: &DatasetSplits,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingOutcome<B>> {
    ensure!(config.batch_size > 0, "batch size must be positive");
    ensure!(!splits.train.is_empty(), "training split is empty");

    let loss_fn = config.loss.init();
    if !loss_fn.is_regularized() {
        warn!("KL weight is 0, training optimizes reconstruction error only");
    }

    let train_loader = create_train_dataloader::<B>(&splits.train, config, device);
    let valid_loader = (!splits.validation.is_empty()).then(|| {
        create_eval_dataloader::<B::InnerBackend>(&splits.validation, config.batch_size, device)
    });

    let mut model = model;
    let mut optim = AdamConfig::new().init();
    let mut history = LossHistory::default();

    for epoch in 1..=config.num_epochs {
        let mut loss_sum = 0.0;
        let mut kl_sum = 0.0;
        for batch in train_loader.iter() {
            model.check_input(&batch.images)?;
            let batch_size = batch.batch_size() as f64;

            let output = model.forward(batch.images.clone());
            let loss = loss_fn.forward(&output, batch.images);

            loss_sum += scalar(loss.total.clone()) * batch_size;
            kl_sum += scalar(loss.kl) * batch_size;

            let grads = loss.total.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(config.learning_rate, model, grads);
        }

        let count = train_loader.num_items() as f64;
        history.train.push(loss_sum / count);
        history.kl.push(kl_sum / count);

        let val_loss = match &valid_loader {
            Some(loader) => {
                let loss = mean_loss(&model.valid(), &loss_fn, loader.as_ref())?;
                history.validation.push(loss);
                Some(loss)
            }
            None => None,
        };

        info!(
            epoch,
            epochs = config.num_epochs,
            train_loss = loss_sum / count,
            val_loss = ?val_loss,
            kl = kl_sum / count,
            "epoch finished"
        );
    }

    Ok(TrainingOutcome { model, history })
}

/// Creates the shuffled training dataloader.
fn create_train_dataloader<B: AutodiffBackend>(
    items: &[ImageItem],
    config: &TrainingConfig,
    device: &B::Device,
) -> Arc<dyn DataLoader<B, VaeBatch<B>>> {
    DataLoaderBuilder::new(ImageBatcher::<B>::new())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .set_device(device.clone())
        .build(ImageFolderDataset::from_items(items.to_vec()))
}

/// Creates an unshuffled dataloader for validation and test scoring.
fn create_eval_dataloader<B: Backend>(
    items: &[ImageItem],
    batch_size: usize,
    device: &B::Device,
) -> Arc<dyn DataLoader<B, VaeBatch<B>>> {
    DataLoaderBuilder::new(ImageBatcher::<B>::new())
        .batch_size(batch_size)
        .set_device(device.clone())
        .build(ImageFolderDataset::from_items(items.to_vec()))
}

/// Mean reconstruction MSE of `model` over `items`, weighted by batch size.
///
/// Reconstructions go through the sampled latent, as during training.
///
/// # Errors
///
/// Returns an error if `items` is empty, the batch size is zero, or the
/// images do not match the model's input shape.
pub fn evaluate<B: Backend>(
    model: &Vae<B>,
    items: &[ImageItem],
    batch_size: usize,
    device: &B::Device,
) -> Result<f64> {
    ensure!(batch_size > 0, "batch size must be positive");
    ensure!(!items.is_empty(), "nothing to evaluate");

    let loader = create_eval_dataloader::<B>(items, batch_size, device);
    mean_loss(model, &VaeLossConfig::new().init(), loader.as_ref())
}

fn mean_loss<B: Backend>(
    model: &Vae<B>,
    loss_fn: &VaeLoss,
    loader: &dyn DataLoader<B, VaeBatch<B>>,
) -> Result<f64> {
    let mut sum = 0.0;
    for batch in loader.iter() {
        model.check_input(&batch.images)?;
        let n = batch.batch_size() as f64;
        let output = model.forward(batch.images.clone());
        sum += scalar(loss_fn.forward(&output, batch.images).total) * n;
    }
    Ok(sum / loader.num_items() as f64)
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

/// Module tree followed by the trainable parameter count.
pub fn architecture_summary<B: Backend>(model: &Vae<B>) -> String {
    format!("{model}\n\nTotal params: {}\n", model.num_params())
}

/// Originals of the first `samples` items stacked over their reconstructions,
/// each row under its own caption.
///
/// # Errors
///
/// Returns an error if `items` is empty or the tensors cannot be converted to images.
pub fn reconstruction_comparison<B: Backend>(
    model: &Vae<B>,
    items: &[ImageItem],
    samples: usize,
    device: &B::Device,
) -> Result<image::RgbImage> {
    let take = samples.min(items.len());
    ensure!(take > 0, "no test images to compare");

    let batch = ImageBatcher::<B>::new().batch(items[..take].to_vec(), device);
    model.check_input(&batch.images)?;
    let reconstruction = model.forward(batch.images.clone()).reconstruction;

    let originals = tensor_to_rgb_images(batch.images)?;
    let reconstructions = tensor_to_rgb_images(reconstruction)?;
    captioned_comparison(&originals, &reconstructions)
}

/// Writes `model.mpk`, `config.json` and `signature.json` into `dir`.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub fn save_bundle<B: Backend>(model: Vae<B>, config: &TrainingConfig, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let shape = model.input_shape();
    let signature = ModelSignature::for_tensor(&shape, &shape, "float32");
    fs::write(dir.join("signature.json"), signature.to_json()?)?;
    config.save(dir.join("config.json"))?;

    model
        .save_file(
            dir.join("model"),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        )
        .map_err(|e| anyhow::anyhow!("failed to save model: {e}"))?;

    Ok(())
}

/// Loads a model saved by [`save_bundle`].
///
/// # Errors
///
/// Returns an error if the bundle's config or weights cannot be read.
pub fn load_bundle<B: Backend>(dir: &Path, device: &B::Device) -> Result<Vae<B>> {
    let config = TrainingConfig::load(dir.join("config.json"))?;
    let model = config.model.init::<B>(device)?;
    model
        .load_file(
            dir.join("model"),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )
        .map_err(|e| anyhow::anyhow!("failed to load model from {}: {e}", dir.display()))
}

/// Runs the complete training protocol inside one tracked run.
///
/// Loads and splits the data, trains, scores the test split, and logs
/// params, per-epoch metrics, plots and the model bundle before registering
/// the model. The run is marked failed if any step errors.
///
/// # Errors
///
/// Returns an error if loading, training, writing artifacts or any tracking
/// call fails.
pub fn run_training_on_device<B: AutodiffBackend, T: TrackingBackend>(
    device: B::Device,
    config: &TrainingConfig,
    tracker: &ExperimentTracker<T>,
    run_name: &str,
) -> Result<TrainingReport> {
    info!(?device, data = %config.data_dir, "initializing VAE training");
    ensure!(
        config.model.channels == RGB_CHANNELS,
        "training images are RGB but the model expects {} channels",
        config.model.channels
    );
    config.model.validate()?;

    let image_size =
        u32::try_from(config.model.image_size).context("image size does not fit in u32")?;
    let dataset = ImageFolderDataset::load(&config.data_dir, image_size)?;
    let splits =
        DatasetSplits::new(dataset.into_items(), config.test_split, config.validation_split)?;

    let output_dir = PathBuf::from(&config.output_dir);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    tracker.with_run(run_name, |run| {
        run_protocol::<B, T>(run, &device, config, &splits, &output_dir)
    })
}

fn run_protocol<B: AutodiffBackend, T: TrackingBackend>(
    run: &ActiveRun<'_, T>,
    device: &B::Device,
    config: &TrainingConfig,
    splits: &DatasetSplits,
    output_dir: &Path,
) -> Result<TrainingReport> {
    run.log_param("epochs", config.num_epochs)?;
    run.log_param("batch_size", config.batch_size)?;
    run.log_param("latent_dim", config.model.latent_dim)?;
    run.log_param("learning_rate", config.learning_rate)?;
    run.log_param("image_size", config.model.image_size)?;
    run.log_param("kl_weight", config.loss.kl_weight)?;

    B::seed(config.seed);
    let model = config.model.init::<B>(device)?;

    let architecture = output_dir.join("architecture.txt");
    fs::write(&architecture, architecture_summary(&model))?;
    run.log_artifact(&architecture, None)?;

    let TrainingOutcome { model, history } = train(model, splits, config, device)?;
    for (epoch, loss) in history.train.iter().enumerate() {
        run.log_metric("train_loss", *loss, epoch as i64)?;
    }
    for (epoch, loss) in history.validation.iter().enumerate() {
        run.log_metric("val_loss", *loss, epoch as i64)?;
    }
    for (epoch, kl) in history.kl.iter().enumerate() {
        run.log_metric("kl_divergence", *kl, epoch as i64)?;
    }

    let model = model.valid();
    let test_mse = evaluate(&model, &splits.test, config.batch_size, device)?;
    info!(test_mse, "evaluated test split");
    run.log_metric("test_mse", test_mse, 0)?;

    let chart = render_loss_chart(&history.train, &history.validation, CHART_WIDTH, CHART_HEIGHT);
    let chart_path = output_dir.join("loss_chart.png");
    save_image(&DynamicImage::ImageRgb8(chart), &chart_path)?;
    run.log_artifact(&chart_path, None)?;

    let comparison =
        reconstruction_comparison(&model, &splits.test, config.comparison_samples, device)?;
    let comparison_path = output_dir.join("test_comparison.png");
    save_image(&DynamicImage::ImageRgb8(comparison), &comparison_path)?;
    run.log_artifact(&comparison_path, None)?;

    let bundle = output_dir.join(BUNDLE_DIR);
    save_bundle(model, config, &bundle)?;
    run.log_artifacts(&bundle, Some(BUNDLE_DIR))?;
    let model_version = run.register_model(&config.registered_model_name, BUNDLE_DIR)?;
    info!(
        name = %model_version.name,
        version = model_version.version,
        "registered model"
    );

    Ok(TrainingReport {
        run: run.info().clone(),
        history,
        test_mse,
        model_version,
    })
}

/// Runs training on the backend selected at compile time.
///
/// # Errors
///
/// Returns an error if the data directory is missing or training fails.
pub fn run_training<T: TrackingBackend>(
    config: &TrainingConfig,
    tracker: &ExperimentTracker<T>,
    run_name: &str,
) -> Result<TrainingReport> {
    ensure!(
        Path::new(&config.data_dir).is_dir(),
        "data directory not found: {}",
        config.data_dir
    );

    info!(
        backend = NAME,
        epochs = config.num_epochs,
        batch_size = config.batch_size,
        latent_dim = config.model.latent_dim,
        learning_rate = config.learning_rate,
        "starting training"
    );
    run_training_on_device::<TrainBackend, T>(
        InferenceDevice::default(),
        config,
        tracker,
        run_name,
    )
}

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};
    use kitvae_tracking::{LocalFileStore, RunStatus};

    use crate::plots::CAPTION_HEIGHT;
    use super::*;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn small_model() -> VaeConfig {
        VaeConfig::new()
            .with_image_size(8)
            .with_latent_dim(2)
            .with_filters(vec![2, 4])
    }

    fn item(shade: f32) -> ImageItem {
        ImageItem {
            pixels: vec![shade; 8 * 8 * 3],
            height: 8,
            width: 8,
            path: PathBuf::from(format!("{shade}.png")),
        }
    }

    fn splits(train: usize, validation: usize, test: usize) -> DatasetSplits {
        let shade = |i: usize| (i % 10) as f32 / 10.0;
        DatasetSplits {
            train: (0..train).map(|i| item(shade(i))).collect(),
            validation: (0..validation).map(|i| item(shade(i + 3))).collect(),
            test: (0..test).map(|i| item(shade(i + 7))).collect(),
        }
    }

    fn config(dir: &Path) -> TrainingConfig {
        TrainingConfig::new()
            .with_model(small_model())
            .with_num_epochs(2)
            .with_batch_size(3)
            .with_comparison_samples(2)
            .with_data_dir(dir.join("interim").display().to_string())
            .with_output_dir(dir.join("artifacts").display().to_string())
    }

    #[test]
    fn default_config_matches_training_script() {
        let config = TrainingConfig::new();

        assert_eq!(config.num_epochs, 5);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.test_split, 0.2);
        assert_eq!(config.validation_split, 0.1);
        assert_eq!(config.model.latent_dim, 128);
        assert_eq!(config.loss.kl_weight, 0.0);
        assert_eq!(config.registered_model_name, "image_generation_models");
    }

    #[test]
    fn config_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.json");
        let config = TrainingConfig::new()
            .with_seed(7)
            .with_loss(VaeLossConfig::new().with_kl_weight(0.5));

        config.save(&path).unwrap();
        let loaded = TrainingConfig::load(&path).unwrap();

        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.loss.kl_weight, 0.5);
        assert_eq!(loaded.model.filters, vec![32, 64]);
    }

    #[test]
    fn load_rejects_missing_file() {
        assert!(TrainingConfig::load("/nonexistent/training.json").is_err());
    }

    #[test]
    fn train_records_one_entry_per_epoch() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let model = small_model().init::<TestAutodiffBackend>(&device).unwrap();

        let outcome = train(model, &splits(7, 2, 2), &config, &device).unwrap();

        assert_eq!(outcome.history.epochs(), 2);
        assert_eq!(outcome.history.validation.len(), 2);
        assert_eq!(outcome.history.kl.len(), 2);
        assert!(outcome.history.train.iter().all(|l| l.is_finite() && *l >= 0.0));
    }

    #[test]
    fn train_without_validation_split_skips_validation_loss() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path()).with_num_epochs(1);
        let model = small_model().init::<TestAutodiffBackend>(&device).unwrap();

        let outcome = train(model, &splits(4, 0, 1), &config, &device).unwrap();

        assert_eq!(outcome.history.train.len(), 1);
        assert!(outcome.history.validation.is_empty());
    }

    #[test]
    fn train_rejects_zero_batch_size() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path()).with_batch_size(0);
        let model = small_model().init::<TestAutodiffBackend>(&device).unwrap();

        assert!(train(model, &splits(4, 0, 1), &config, &device).is_err());
    }

    #[test]
    fn train_rejects_images_that_do_not_match_model_channels() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let gray = small_model().with_channels(1);
        let config = config(dir.path()).with_model(gray.clone()).with_num_epochs(1);
        let model = gray.init::<TestAutodiffBackend>(&device).unwrap();

        let result = train(model, &splits(4, 0, 1), &config, &device);

        assert!(result.is_err());
    }

    #[test]
    fn evaluate_rejects_images_of_wrong_size() {
        let device = Default::default();
        let model = small_model().with_image_size(16).init::<TestBackend>(&device).unwrap();

        assert!(evaluate(&model, &[item(0.5)], 2, &device).is_err());
    }

    #[test]
    fn single_channel_model_fails_before_run_starts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path()).with_model(small_model().with_channels(1));
        let interim = dir.path().join("interim");
        fs::create_dir_all(&interim).unwrap();
        for i in 0..5u8 {
            RgbImage::from_pixel(8, 8, Rgb([i * 40, 0, 0]))
                .save(interim.join(format!("kit_{i}.png")))
                .unwrap();
        }

        let store = LocalFileStore::new(dir.path().join("mlruns")).unwrap();
        let tracker = ExperimentTracker::new(store, "kit_vae");
        let result = run_training_on_device::<TestAutodiffBackend, _>(
            Default::default(),
            &config,
            &tracker,
            "gray",
        );

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("RGB"), "{message}");
        assert!(!dir.path().join("mlruns").join("kit_vae").exists());
    }

    #[test]
    fn evaluate_of_black_images_on_blank_model_is_small_but_positive() {
        let device = Default::default();
        let model = small_model().init::<TestBackend>(&device).unwrap();
        let items = vec![item(0.0), item(0.0), item(0.0)];

        let mse = evaluate(&model, &items, 2, &device).unwrap();

        // Sigmoid output lies in (0, 1), so the error against black is in (0, 1).
        assert!(mse > 0.0 && mse < 1.0);
        assert!(evaluate(&model, &[], 2, &device).is_err());
    }

    #[test]
    fn comparison_is_two_rows_of_requested_samples() {
        let device = Default::default();
        let model = small_model().init::<TestBackend>(&device).unwrap();
        let items = vec![item(1.0), item(0.5), item(0.0)];

        let grid = reconstruction_comparison(&model, &items, 2, &device).unwrap();

        assert_eq!(grid.dimensions(), (16, 16 + 2 * CAPTION_HEIGHT));
        assert_eq!(grid.get_pixel(0, CAPTION_HEIGHT).0, [255, 255, 255]);
        assert_eq!(grid.get_pixel(8, CAPTION_HEIGHT).0, [128, 128, 128]);
    }

    #[test]
    fn architecture_summary_reports_parameter_count() {
        let device = Default::default();
        let model = small_model().init::<TestBackend>(&device).unwrap();

        let summary = architecture_summary(&model);

        assert!(summary.contains(&format!("Total params: {}", model.num_params())));
    }

    #[test]
    fn bundle_round_trips_weights() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let model = small_model().init::<TestBackend>(&device).unwrap();
        let latent = Tensor::<TestBackend, 2>::ones([1, 2], &device);
        let expected = model.decode(latent.clone());

        save_bundle(model, &config, &dir.path().join(BUNDLE_DIR)).unwrap();
        let loaded = load_bundle::<TestBackend>(&dir.path().join(BUNDLE_DIR), &device).unwrap();

        for file in ["model.mpk", "config.json", "signature.json"] {
            assert!(dir.path().join(BUNDLE_DIR).join(file).is_file(), "{file}");
        }
        assert_eq!(
            loaded.decode(latent).into_data().to_vec::<f32>().unwrap(),
            expected.into_data().to_vec::<f32>().unwrap()
        );
    }

    #[test]
    fn tracked_run_logs_metrics_artifacts_and_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let interim = dir.path().join("interim");
        fs::create_dir_all(&interim).unwrap();
        for i in 0..10u8 {
            RgbImage::from_pixel(8, 8, Rgb([i * 20, 40, 200 - i * 10]))
                .save(interim.join(format!("kit_{i:02}.png")))
                .unwrap();
        }

        let store = LocalFileStore::new(dir.path().join("mlruns")).unwrap();
        let tracker = ExperimentTracker::new(store, "kit_vae");
        let report = run_training_on_device::<TestAutodiffBackend, _>(
            Default::default(),
            &config,
            &tracker,
            "test-run",
        )
        .unwrap();

        let store = tracker.backend();
        assert_eq!(store.load_run_meta(&report.run).unwrap().status, RunStatus::Finished);
        assert_eq!(store.read_metric(&report.run, "train_loss").unwrap().len(), 2);
        assert_eq!(store.read_metric(&report.run, "val_loss").unwrap().len(), 2);
        let kl = store.read_metric(&report.run, "kl_divergence").unwrap();
        assert_eq!(kl.len(), 2);
        assert!(kl.iter().all(|(_, value)| value.is_finite() && *value >= 0.0));
        assert_eq!(store.read_metric(&report.run, "test_mse").unwrap().len(), 1);
        assert_eq!(
            fs::read_to_string(store.run_dir(&report.run).join("params").join("latent_dim"))
                .unwrap(),
            "2"
        );

        let artifacts = store.artifact_dir(&report.run);
        for file in ["architecture.txt", "loss_chart.png", "test_comparison.png"] {
            assert!(artifacts.join(file).is_file(), "{file}");
        }
        assert!(artifacts.join(BUNDLE_DIR).join("model.mpk").is_file());
        assert_eq!(report.model_version.name, "image_generation_models");
        assert_eq!(report.model_version.version, 1);
        assert!(report.test_mse.is_finite());
    }

    #[test]
    fn failed_run_is_marked_failed() {
        let dir = tempfile::tempdir().unwrap();
        // No comparison samples makes the run fail after training.
        let config = config(dir.path()).with_num_epochs(1).with_comparison_samples(0);
        let interim = dir.path().join("interim");
        fs::create_dir_all(&interim).unwrap();
        for i in 0..5u8 {
            RgbImage::from_pixel(8, 8, Rgb([i * 40, 0, 0]))
                .save(interim.join(format!("kit_{i}.png")))
                .unwrap();
        }

        let store = LocalFileStore::new(dir.path().join("mlruns")).unwrap();
        let tracker = ExperimentTracker::new(store, "kit_vae");
        let result = run_training_on_device::<TestAutodiffBackend, _>(
            Default::default(),
            &config,
            &tracker,
            "doomed",
        );

        assert!(result.is_err());
        let runs: Vec<_> = fs::read_dir(dir.path().join("mlruns").join("kit_vae"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.is_dir())
            .collect();
        assert_eq!(runs.len(), 1);
        let meta = fs::read_to_string(runs[0].join("meta.json")).unwrap();
        assert!(meta.contains("FAILED"));
    }
}
