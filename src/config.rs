//! Report configuration

use crate::error::{ReportError, Result};
use crate::preprocessing::{ImputePlan, ImputeStrategy};
use crate::visualization::{figure_format, RenderConfig, ScreenshotConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Clinical features used by the model, in model column order
pub const DEFAULT_FEATURES: [&str; 10] = [
    "DR",
    "Duration of DM",
    "HbA1c",
    "Serum creatinine",
    "TC",
    "Urine protein excretion",
    "FBG",
    "BMI",
    "Age",
    "SBP",
];

/// Target column holding the pathology label
pub const DEFAULT_TARGET: &str = "Pathology type";

/// File names of everything a run writes, relative to the output directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputFiles {
    /// Imputed features plus target, kept for auditing
    pub processed_csv: String,
    pub summary_plot: String,
    pub summary_bar_plot: String,
    pub force_html: String,
    /// Screenshot of the force page
    pub force_image: String,
    pub waterfall_plot: String,
}

impl Default for OutputFiles {
    fn default() -> Self {
        Self {
            processed_csv: "your_data.csv".to_string(),
            summary_plot: "shap_summary_plot.svg".to_string(),
            summary_bar_plot: "shap_summary_bar_plot.svg".to_string(),
            force_html: "shap_force_plot.html".to_string(),
            force_image: "shap_force_plot.png".to_string(),
            waterfall_plot: "shap_waterfall_plot.svg".to_string(),
        }
    }
}

/// Configuration for a full report run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Input table
    pub data_path: PathBuf,
    /// Directory receiving every output file
    pub output_dir: PathBuf,
    /// Feature columns in model order
    pub feature_names: Vec<String>,
    /// Target column name
    pub target_name: String,
    /// Columns imputed with the median; every other feature uses the mean
    pub median_columns: Vec<String>,
    /// Fraction of rows held out for attribution
    pub test_size: f64,
    /// Seed shared by the split and the forest
    pub random_state: u64,
    /// Number of trees
    pub n_estimators: usize,
    /// Class whose attributions are reported
    pub class_index: usize,
    /// Test row explained by the force and waterfall plots
    pub sample_index: usize,
    /// Check that attributions add up to the model output
    pub check_additivity: bool,
    pub outputs: OutputFiles,
    pub render: RenderConfig,
    pub screenshot: ScreenshotConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("test1.csv"),
            output_dir: PathBuf::from("."),
            feature_names: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
            target_name: DEFAULT_TARGET.to_string(),
            median_columns: vec!["DR".to_string()],
            test_size: 0.2,
            random_state: 42,
            n_estimators: 100,
            class_index: 1,
            sample_index: 5,
            check_additivity: true,
            outputs: OutputFiles::default(),
            render: RenderConfig::default(),
            screenshot: ScreenshotConfig::default(),
        }
    }
}

impl ReportConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReportError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_features(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    pub fn with_target(mut self, name: impl Into<String>) -> Self {
        self.target_name = name.into();
        self
    }

    pub fn with_median_columns(mut self, columns: Vec<String>) -> Self {
        self.median_columns = columns;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_class_index(mut self, index: usize) -> Self {
        self.class_index = index;
        self
    }

    pub fn with_sample_index(mut self, index: usize) -> Self {
        self.sample_index = index;
        self
    }

    pub fn with_screenshot(mut self, screenshot: ScreenshotConfig) -> Self {
        self.screenshot = screenshot;
        self
    }

    pub fn with_render(mut self, render: RenderConfig) -> Self {
        self.render = render;
        self
    }

    /// Per-column imputation plan derived from the feature list
    pub fn impute_plan(&self) -> ImputePlan {
        let median: HashSet<&str> = self.median_columns.iter().map(String::as_str).collect();
        let mut plan = ImputePlan::new();
        for name in &self.feature_names {
            let strategy = if median.contains(name.as_str()) {
                ImputeStrategy::Median
            } else {
                ImputeStrategy::Mean
            };
            plan = plan.with_column(name.clone(), strategy);
        }
        plan
    }

    /// Absolute location of an output file
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Reject settings that would only fail halfway through a run
    pub fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(ReportError::Config("feature list is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for name in &self.feature_names {
            if !seen.insert(name.as_str()) {
                return Err(ReportError::Config(format!("duplicate feature '{}'", name)));
            }
        }

        if seen.contains(self.target_name.as_str()) {
            return Err(ReportError::Config(format!(
                "target '{}' is also listed as a feature",
                self.target_name
            )));
        }

        if let Some(col) = self.median_columns.iter().find(|c| !seen.contains(c.as_str())) {
            return Err(ReportError::Config(format!(
                "median column '{}' is not a feature",
                col
            )));
        }

        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ReportError::Config(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }

        if self.n_estimators == 0 {
            return Err(ReportError::Config("n_estimators must be positive".to_string()));
        }

        for figure in [
            &self.outputs.summary_plot,
            &self.outputs.summary_bar_plot,
            &self.outputs.waterfall_plot,
        ] {
            figure_format(Path::new(figure)).map_err(|e| ReportError::Config(e.to_string()))?;
        }

        self.render.validate()
    }
}
