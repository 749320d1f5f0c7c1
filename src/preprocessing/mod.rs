//! Data preprocessing module
//!
//! Provides the preparation steps run before training:
//! - Missing value imputation with per-column strategies
//! - Target label encoding

mod encoder;
mod imputer;

pub use encoder::LabelEncoder;
pub use imputer::{count_missing, ImputePlan, ImputeStrategy, Imputer};
