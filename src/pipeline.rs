//! End-to-end report run
//!
//! Load, impute, split, train, attribute and render, in that order. Every
//! stage up to the figures is fatal on error; the closing screenshot is
//! best-effort and only logged.

use crate::config::ReportConfig;
use crate::error::{BrowserError, ReportError, Result};
use crate::explainability::{Explanation, TreeExplainer};
use crate::preprocessing::{count_missing, Imputer, LabelEncoder};
use crate::training::{
    accuracy, roc_auc, EvaluationMetrics, RandomForest, StratifiedSplitter, TrainTestSplit,
};
use crate::utils::{DataLoader, DataSaver, Dataset};
use crate::visualization::{HeadlessBrowser, NoopRasterizer, PageRasterizer, Renderer};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Largest tolerated gap between summed attributions and the model output
const ADDITIVITY_TOLERANCE: f64 = 1e-6;

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArtifacts {
    pub processed_csv: PathBuf,
    pub summary_plot: PathBuf,
    pub summary_bar_plot: PathBuf,
    pub force_html: PathBuf,
    pub waterfall_plot: PathBuf,
    /// Screenshot of the force page, when the browser step succeeded
    pub force_image: Option<PathBuf>,
    /// Encoded class labels, in class-index order
    pub classes: Vec<String>,
    pub n_train: usize,
    pub n_test: usize,
    pub metrics: EvaluationMetrics,
    /// Max |sum(phi) + E - p| over the test rows, when checked
    pub additivity_error: Option<f64>,
    /// Explained row: base value and reconstructed model output
    pub base_value: f64,
    pub sample_output: f64,
    pub training_time_secs: f64,
}

/// Imputed data, split and fitted model
struct TrainedStage {
    dataset: Dataset,
    classes: Vec<String>,
    x: Array2<f64>,
    labels: Vec<usize>,
    split: TrainTestSplit,
    forest: RandomForest,
    training_time_secs: f64,
}

/// Report pipeline with an injectable page rasterizer
pub struct ReportPipeline {
    config: ReportConfig,
    rasterizer: Box<dyn PageRasterizer>,
}

impl ReportPipeline {
    /// Create a pipeline; the screenshot step uses a headless browser unless
    /// disabled in the configuration
    pub fn new(config: ReportConfig) -> Self {
        let rasterizer: Box<dyn PageRasterizer> = if config.screenshot.enabled {
            Box::new(HeadlessBrowser::new(config.screenshot.clone()))
        } else {
            Box::new(NoopRasterizer)
        };
        Self { config, rasterizer }
    }

    /// Replace the screenshot capability
    pub fn with_rasterizer(mut self, rasterizer: Box<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Run every stage once
    pub fn run(&self) -> Result<ReportArtifacts> {
        self.config.validate()?;
        std::fs::create_dir_all(&self.config.output_dir)?;

        let trained = self.train()?;
        let x_test = trained.x.select(Axis(0), &trained.split.test_indices);
        let y_test: Vec<usize> = trained
            .split
            .test_indices
            .iter()
            .map(|&i| trained.labels[i])
            .collect();

        let metrics = self.evaluate(&trained.forest, &x_test, &y_test)?;

        // Attribution
        let explainer = TreeExplainer::new(&trained.forest)?;
        let start = Instant::now();
        let tensor = explainer.shap_values(&x_test)?;
        info!(
            rows = tensor.n_rows(),
            features = tensor.n_features(),
            classes = tensor.n_classes(),
            elapsed = ?start.elapsed(),
            "Computed SHAP values"
        );

        let additivity_error = if self.config.check_additivity {
            let err = explainer.additivity_error(&x_test, &tensor)?;
            if err > ADDITIVITY_TOLERANCE {
                warn!(max_error = err, "SHAP values do not add up to the model output");
            } else {
                debug!(max_error = err, "Additivity check passed");
            }
            Some(err)
        } else {
            None
        };

        let class_index = self.config.class_index;
        let values = tensor.class_slice(class_index)?;
        let base_value = tensor.expected_value(class_index)?;
        info!(
            class = %trained.classes[class_index],
            expected_value = base_value,
            "Explaining class {}", class_index
        );

        // Figures
        let names = &trained.dataset.feature_names;
        let renderer = Renderer::new(self.config.render.clone());
        let outputs = &self.config.outputs;

        let summary_plot = self.config.output_path(&outputs.summary_plot);
        renderer.summary_plot(&values, &x_test, names, &summary_plot)?;

        let summary_bar_plot = self.config.output_path(&outputs.summary_bar_plot);
        renderer.summary_bar_plot(&values, names, &summary_bar_plot)?;

        let explanation =
            Explanation::from_row(&values, &x_test, self.config.sample_index, base_value, names)?;

        let force_html = self.config.output_path(&outputs.force_html);
        renderer.force_plot_html(&explanation, &force_html)?;

        let waterfall_plot = self.config.output_path(&outputs.waterfall_plot);
        renderer.waterfall_plot(&explanation, &waterfall_plot)?;

        let force_image = self.capture_force_page(&force_html);

        Ok(ReportArtifacts {
            processed_csv: self.config.output_path(&outputs.processed_csv),
            summary_plot,
            summary_bar_plot,
            force_html,
            waterfall_plot,
            force_image,
            classes: trained.classes,
            n_train: trained.split.train_indices.len(),
            n_test: trained.split.test_indices.len(),
            metrics,
            additivity_error,
            base_value,
            sample_output: explanation.prediction(),
            training_time_secs: trained.training_time_secs,
        })
    }

    /// Load, impute, persist, split and fit
    fn train(&self) -> Result<TrainedStage> {
        let config = &self.config;

        let start = Instant::now();
        let raw = DataLoader::new().load_auto(&config.data_path)?;
        info!(
            path = %config.data_path.display(),
            rows = raw.height(),
            cols = raw.width(),
            elapsed = ?start.elapsed(),
            "Loaded data"
        );

        let dataset = Dataset::from_frame(&raw, &config.feature_names, &config.target_name)?;
        info!(features = ?dataset.feature_names, "Feature columns");

        // Imputation
        let missing = count_missing(&dataset.features, &dataset.feature_names)?;
        let mut imputer = Imputer::new(config.impute_plan());
        let imputed = imputer.fit_transform(&dataset.features)?;
        let dataset = dataset.with_features(imputed)?;

        let remaining = count_missing(&dataset.features, &dataset.feature_names)?;
        if remaining > 0 {
            return Err(ReportError::Imputation(format!(
                "{} missing values left after imputation",
                remaining
            )));
        }
        info!(filled = missing, "Imputed missing values");

        let processed_csv = config.output_path(&config.outputs.processed_csv);
        DataSaver::save_csv(&mut dataset.to_frame()?, &processed_csv)?;
        info!(path = %processed_csv.display(), "Saved processed data");

        // Labels
        let mut encoder = LabelEncoder::new();
        let labels = encoder.fit_transform(&dataset.target)?;
        let classes = encoder.classes().to_vec();
        info!(target = %config.target_name, classes = ?classes, "Target values");

        if config.class_index >= classes.len() {
            return Err(ReportError::Config(format!(
                "class index {} out of range for {} classes",
                config.class_index,
                classes.len()
            )));
        }

        // Split
        let split = StratifiedSplitter::new(config.test_size)
            .with_random_state(config.random_state)
            .split(&labels)?;
        info!(
            train = split.train_indices.len(),
            test = split.test_indices.len(),
            "Stratified split"
        );

        if config.sample_index >= split.test_indices.len() {
            return Err(ReportError::Config(format!(
                "sample index {} out of range for {} test rows",
                config.sample_index,
                split.test_indices.len()
            )));
        }

        // Training
        let x = dataset.feature_matrix()?;
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train: Vec<usize> = split.train_indices.iter().map(|&i| labels[i]).collect();

        let start = Instant::now();
        let mut forest = RandomForest::new_classifier(config.n_estimators)
            .with_random_state(config.random_state);
        forest.fit(&x_train, &y_train)?;
        let training_time_secs = start.elapsed().as_secs_f64();
        info!(
            trees = forest.n_trees(),
            features = forest.n_features(),
            secs = training_time_secs,
            "Trained random forest"
        );

        Ok(TrainedStage {
            dataset,
            classes,
            x,
            labels,
            split,
            forest,
            training_time_secs,
        })
    }

    /// Hold-out scores, logged only
    fn evaluate(
        &self,
        forest: &RandomForest,
        x_test: &Array2<f64>,
        y_test: &[usize],
    ) -> Result<EvaluationMetrics> {
        let proba = forest.predict_proba(x_test)?;
        let predicted = forest.predict(x_test)?;

        let class_index = self.config.class_index;
        let is_class: Vec<bool> = y_test.iter().map(|&y| y == class_index).collect();
        let scores: Vec<f64> = proba.column(class_index).to_vec();

        let metrics = EvaluationMetrics {
            accuracy: accuracy(y_test, &predicted),
            roc_auc: roc_auc(&is_class, &scores),
            n_test: y_test.len(),
        };

        match metrics.roc_auc {
            Some(auc) => info!(accuracy = metrics.accuracy, roc_auc = auc, "Test set evaluation"),
            None => info!(accuracy = metrics.accuracy, "Test set evaluation"),
        }

        Ok(metrics)
    }

    /// Best-effort screenshot; failures are logged and swallowed
    fn capture_force_page(&self, force_html: &std::path::Path) -> Option<PathBuf> {
        if !self.config.screenshot.enabled {
            return None;
        }

        let image = self.config.output_path(&self.config.outputs.force_image);
        match self.rasterizer.rasterize(force_html, &image) {
            Ok(()) if image.is_file() => {
                info!(path = %image.display(), "Saved force plot screenshot");
                Some(image)
            }
            Ok(()) => None,
            Err(BrowserError::NotFound(msg)) => {
                warn!("Screenshot skipped, browser component missing: {}", msg);
                None
            }
            Err(BrowserError::Driver(msg)) => {
                error!("Screenshot failed in the browser driver: {}", msg);
                None
            }
            Err(BrowserError::Other(msg)) => {
                error!("Screenshot failed: {}", msg);
                None
            }
        }
    }
}
