//! Target label encoding

use crate::error::{ReportError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Maps categorical target labels to class indices `0..n_classes`.
///
/// Classes are sorted numerically when every label parses as a number and
/// lexicographically otherwise, so `"2"` sorts before `"10"` for numeric codes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the class list from a target column
    pub fn fit(&mut self, target: &Column) -> Result<&mut Self> {
        let mut labels = labels_of(target)?;
        labels.sort_by(compare_labels);
        labels.dedup();

        if labels.is_empty() {
            return Err(ReportError::Data("target column is empty".to_string()));
        }

        self.classes = labels;
        Ok(self)
    }

    /// Encode a target column into class indices
    pub fn transform(&self, target: &Column) -> Result<Vec<usize>> {
        labels_of(target)?
            .iter()
            .map(|label| {
                self.classes
                    .iter()
                    .position(|c| c == label)
                    .ok_or_else(|| ReportError::Data(format!("unknown target label '{}'", label)))
            })
            .collect()
    }

    pub fn fit_transform(&mut self, target: &Column) -> Result<Vec<usize>> {
        self.fit(target)?;
        self.transform(target)
    }

    /// Sorted class labels; index = encoded class
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }
}

fn labels_of(target: &Column) -> Result<Vec<String>> {
    let as_str = target.cast(&DataType::String)?;
    as_str
        .str()?
        .into_iter()
        .map(|v| {
            v.map(|s| s.trim().to_string())
                .ok_or_else(|| ReportError::Data("missing target label".to_string()))
        })
        .collect()
}

fn compare_labels(a: &String, b: &String) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_labels_sort_numerically() {
        let target = Column::new("y".into(), &[10i64, 2, 2, 10, 1]);
        let mut encoder = LabelEncoder::new();
        let encoded = encoder.fit_transform(&target).unwrap();

        assert_eq!(encoder.classes(), &["1", "2", "10"]);
        assert_eq!(encoded, vec![2, 1, 1, 2, 0]);
    }

    #[test]
    fn test_string_labels() {
        let target = Column::new("y".into(), &["NDRD", "DN", "DN"]);
        let mut encoder = LabelEncoder::new();
        let encoded = encoder.fit_transform(&target).unwrap();

        assert_eq!(encoder.n_classes(), 2);
        assert_eq!(encoded, vec![1, 0, 0]);
    }

    #[test]
    fn test_unknown_label() {
        let mut encoder = LabelEncoder::new();
        encoder.fit(&Column::new("y".into(), &["a", "b"])).unwrap();
        let err = encoder.transform(&Column::new("y".into(), &["c"])).unwrap_err();
        assert!(matches!(err, ReportError::Data(_)));
    }
}
