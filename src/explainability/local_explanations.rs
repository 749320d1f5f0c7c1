//! Single-row explanations

use crate::error::{ReportError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Feature contribution to a prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContribution {
    /// Feature index
    pub feature_index: usize,
    pub feature_name: String,
    /// Feature value for this instance
    pub feature_value: f64,
    /// Contribution to prediction (SHAP value)
    pub contribution: f64,
}

/// Attributions of one row towards the explained class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    /// Row position in the attributed table
    pub instance_index: usize,
    pub values: Array1<f64>,
    /// Raw feature values of the row
    pub data: Array1<f64>,
    /// Expected model output for the explained class
    pub base_value: f64,
    pub feature_names: Vec<String>,
}

impl Explanation {
    /// Pick row `index` out of an attribution matrix and its feature matrix
    pub fn from_row(
        values: &Array2<f64>,
        data: &Array2<f64>,
        index: usize,
        base_value: f64,
        feature_names: &[String],
    ) -> Result<Self> {
        if index >= values.nrows() {
            return Err(ReportError::Config(format!(
                "sample index {} out of range for {} attributed rows",
                index,
                values.nrows()
            )));
        }

        if values.dim() != data.dim() || values.ncols() != feature_names.len() {
            return Err(ReportError::Shape {
                expected: format!("{} x {}", values.nrows(), feature_names.len()),
                actual: format!("values {:?}, data {:?}", values.dim(), data.dim()),
            });
        }

        Ok(Self {
            instance_index: index,
            values: values.row(index).to_owned(),
            data: data.row(index).to_owned(),
            base_value,
            feature_names: feature_names.to_vec(),
        })
    }

    /// Model output reconstructed from the attributions
    pub fn prediction(&self) -> f64 {
        self.base_value + self.sum_contributions()
    }

    /// Get sum of contributions
    pub fn sum_contributions(&self) -> f64 {
        self.values.sum()
    }

    pub fn contributions(&self) -> Vec<FeatureContribution> {
        self.values
            .iter()
            .zip(self.data.iter())
            .zip(&self.feature_names)
            .enumerate()
            .map(|(i, ((&contribution, &feature_value), name))| FeatureContribution {
                feature_index: i,
                feature_name: name.clone(),
                feature_value,
                contribution,
            })
            .collect()
    }

    /// Get sorted contributions (by absolute value, descending)
    pub fn sorted_contributions(&self) -> Vec<FeatureContribution> {
        let mut sorted = self.contributions();
        sorted.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    fn sample() -> Explanation {
        let values = array![[0.0, 0.0, 0.0], [0.2, -0.5, 0.1]];
        let data = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        Explanation::from_row(&values, &data, 1, 0.5, &names()).unwrap()
    }

    #[test]
    fn test_from_row() {
        let e = sample();
        assert_eq!(e.instance_index, 1);
        assert_eq!(e.data, array![4.0, 5.0, 6.0]);
        assert!((e.prediction() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_sorted_contributions() {
        let e = sample();
        let sorted = e.sorted_contributions();
        assert_eq!(sorted[0].feature_name, "b");
        assert_eq!(sorted[1].feature_name, "a");
        assert_eq!(sorted[0].feature_value, 5.0);
    }

    #[test]
    fn test_index_out_of_range() {
        let values = array![[0.1, 0.2, 0.3]];
        let err = Explanation::from_row(&values, &values, 5, 0.0, &names()).unwrap_err();
        assert!(matches!(err, ReportError::Config(_)));
    }
}
