//! shap-report - Random forest explanations for tabular clinical data
//!
//! This crate trains a random forest on a table of patient records and
//! explains it with exact TreeSHAP:
//! - Data loading and per-column mean/median imputation
//! - Stratified train/test split and random forest training
//! - TreeSHAP attributions per row, feature and class
//! - Summary, bar, force and waterfall figures
//!
//! # Modules
//!
//! - [`utils`] - Tabular data loading and saving
//! - [`preprocessing`] - Imputation and label encoding
//! - [`training`] - Splitting, decision trees, random forest, metrics
//! - [`explainability`] - TreeSHAP and single-row explanations
//! - [`visualization`] - Figures and the headless-browser screenshot
//! - [`pipeline`] - The end-to-end report run
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Data and models
pub mod utils;
pub mod preprocessing;
pub mod training;

// Explanations and output
pub mod explainability;
pub mod visualization;
pub mod pipeline;

// Services
pub mod cli;

pub use error::{BrowserError, ReportError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{BrowserError, ReportError, Result};

    // Configuration
    pub use crate::config::{OutputFiles, ReportConfig};

    // Data
    pub use crate::utils::{DataLoader, DataSaver, Dataset};
    pub use crate::preprocessing::{ImputePlan, ImputeStrategy, Imputer, LabelEncoder};

    // Training
    pub use crate::training::{RandomForest, StratifiedSplitter, TrainTestSplit};

    // Explainability
    pub use crate::explainability::{Explanation, ShapTensor, TreeExplainer};

    // Rendering
    pub use crate::visualization::{
        HeadlessBrowser, NoopRasterizer, PageRasterizer, RenderConfig, Renderer, ScreenshotConfig,
    };

    // Pipeline
    pub use crate::pipeline::{ReportArtifacts, ReportPipeline};
}
