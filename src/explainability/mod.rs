//! Model explainability module
//!
//! Provides model interpretation for the fitted forest:
//! - Exact TreeSHAP attributions per row, feature and class
//! - Single-row explanations with sorted contributions

mod local_explanations;
mod tree_shap;

pub use local_explanations::{Explanation, FeatureContribution};
pub use tree_shap::{importance_order, mean_abs, ShapTensor, TreeExplainer};
