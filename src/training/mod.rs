//! Model training module
//!
//! - Stratified train/test splitting
//! - Decision tree and random forest classifiers
//! - Hold-out metrics

pub mod decision_tree;
pub mod metrics;
pub mod random_forest;
pub mod split;

pub use decision_tree::{DecisionTree, TreeNode};
pub use metrics::{accuracy, roc_auc, EvaluationMetrics};
pub use random_forest::{MaxFeatures, RandomForest};
pub use split::{StratifiedSplitter, TrainTestSplit};
