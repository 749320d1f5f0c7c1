//! Missing value imputation with a per-column strategy

use crate::error::{ReportError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Strategy for imputing missing values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImputeStrategy {
    /// Replace with the mean of observed values
    Mean,
    /// Replace with the median of observed values
    Median,
}

/// Ordered column → strategy assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImputePlan {
    columns: Vec<(String, ImputeStrategy)>,
}

impl ImputePlan {
    /// Create an empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a strategy to a column, replacing any earlier assignment
    pub fn with_column(mut self, name: impl Into<String>, strategy: ImputeStrategy) -> Self {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = strategy,
            None => self.columns.push((name, strategy)),
        }
        self
    }

    /// Strategy assigned to a column
    pub fn strategy_for(&self, name: &str) -> Option<ImputeStrategy> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
    }

    /// Columns grouped by strategy, each group in plan order
    pub fn groups(&self) -> BTreeMap<ImputeStrategy, Vec<&str>> {
        let mut groups: BTreeMap<ImputeStrategy, Vec<&str>> = BTreeMap::new();
        for (name, strategy) in &self.columns {
            groups.entry(*strategy).or_default().push(name.as_str());
        }
        groups
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Imputer for handling missing values.
///
/// Each strategy group is imputed as its own block; the blocks are then
/// stacked and put back into the column order of the input frame, since
/// downstream models identify features by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputer {
    plan: ImputePlan,
    fill_values: HashMap<String, f64>,
    is_fitted: bool,
}

impl Imputer {
    /// Create a new imputer for the given plan
    pub fn new(plan: ImputePlan) -> Self {
        Self {
            plan,
            fill_values: HashMap::new(),
            is_fitted: false,
        }
    }

    /// Compute fill values from the observed cells of each planned column
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        self.fill_values.clear();

        for (strategy, columns) in self.plan.groups() {
            for name in columns {
                let observed = observed_values(df, name)?;
                let fill = match strategy {
                    ImputeStrategy::Mean => observed.mean(),
                    ImputeStrategy::Median => observed.median(),
                }
                .ok_or_else(|| {
                    ReportError::Imputation(format!("column '{}' has no observed values", name))
                })?;

                debug!(column = name, ?strategy, fill, "Fitted fill value");
                self.fill_values.insert(name.to_string(), fill);
            }
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Fill missing cells and reassemble the columns in input order
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(ReportError::ModelNotFitted);
        }

        let mut blocks: Vec<DataFrame> = Vec::new();
        for (_, columns) in self.plan.groups() {
            let filled = columns
                .iter()
                .map(|name| self.fill_column(df, name))
                .collect::<Result<Vec<Column>>>()?;
            blocks.push(DataFrame::new(filled)?);
        }

        // Columns outside the plan pass through untouched
        let passthrough: Vec<Column> = df
            .get_columns()
            .iter()
            .filter(|c| self.plan.strategy_for(c.name().as_str()).is_none())
            .cloned()
            .collect();
        blocks.push(DataFrame::new(passthrough)?);

        let mut combined = DataFrame::new(Vec::new())?;
        for block in &blocks {
            if block.width() == 0 {
                continue;
            }
            combined = if combined.width() == 0 {
                block.clone()
            } else {
                combined.hstack(block.get_columns())?
            };
        }

        let order: Vec<PlSmallStr> = df.get_column_names().into_iter().cloned().collect();
        Ok(combined.select(order)?)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<DataFrame> {
        self.fit(df)?;
        self.transform(df)
    }

    /// Fitted fill value for a column
    pub fn fill_value(&self, name: &str) -> Option<f64> {
        self.fill_values.get(name).copied()
    }

    fn fill_column(&self, df: &DataFrame, name: &str) -> Result<Column> {
        let fill = self
            .fill_values
            .get(name)
            .copied()
            .ok_or_else(|| ReportError::FeatureNotFound(name.to_string()))?;

        let filled: Float64Chunked = observed_values(df, name)?
            .into_iter()
            .map(|v| Some(v.unwrap_or(fill)))
            .collect();

        Ok(filled.with_name(name.into()).into_column())
    }
}

/// Column values as Float64 with NaN folded into null
fn observed_values(df: &DataFrame, name: &str) -> Result<Float64Chunked> {
    let column = df
        .column(name)
        .map_err(|_| ReportError::FeatureNotFound(name.to_string()))?
        .cast(&DataType::Float64)?;

    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Count missing cells (null or NaN) across the given columns
pub fn count_missing(df: &DataFrame, columns: &[String]) -> Result<usize> {
    columns.iter().try_fold(0usize, |acc, name| -> Result<usize> {
        Ok(acc + observed_values(df, name)?.null_count())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ImputePlan {
        ImputePlan::new()
            .with_column("a", ImputeStrategy::Mean)
            .with_column("b", ImputeStrategy::Median)
    }

    #[test]
    fn test_imputer_creation() {
        let imputer = Imputer::new(plan());
        assert!(!imputer.is_fitted);
    }

    #[test]
    fn test_transform_before_fit() {
        let df = df!("a" => &[Some(1.0), None]).unwrap();
        let imputer = Imputer::new(plan());
        assert!(matches!(imputer.transform(&df), Err(ReportError::ModelNotFitted)));
    }

    #[test]
    fn test_mean_imputation_uses_observed_values_only() {
        let df = df!(
            "a" => &[Some(1.0), None, Some(3.0), None, Some(8.0)],
            "b" => &[Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)],
        )
        .unwrap();

        let mut imputer = Imputer::new(plan());
        let result = imputer.fit_transform(&df).unwrap();

        let col = result.column("a").unwrap().f64().unwrap().clone();
        // Mean of [1, 3, 8] = 4
        assert_eq!(col.get(1), Some(4.0));
        assert_eq!(col.get(3), Some(4.0));
        assert_eq!(col.null_count(), 0);
    }

    #[test]
    fn test_median_imputation() {
        let df = df!(
            "a" => &[Some(1.0), Some(1.0), Some(1.0), Some(1.0)],
            "b" => &[Some(0.0), None, Some(3.0), Some(1.0)],
        )
        .unwrap();

        let mut imputer = Imputer::new(plan());
        let result = imputer.fit_transform(&df).unwrap();

        assert_eq!(imputer.fill_value("b"), Some(1.0));
        let col = result.column("b").unwrap().f64().unwrap().clone();
        assert_eq!(col.get(1), Some(1.0));
    }

    #[test]
    fn test_nan_counts_as_missing() {
        let df = df!(
            "a" => &[Some(2.0), Some(f64::NAN), Some(4.0)],
            "b" => &[Some(1.0), Some(1.0), Some(1.0)],
        )
        .unwrap();

        let mut imputer = Imputer::new(plan());
        let result = imputer.fit_transform(&df).unwrap();
        let col = result.column("a").unwrap().f64().unwrap().clone();
        assert_eq!(col.get(1), Some(3.0));
    }

    #[test]
    fn test_reassembles_input_column_order() {
        // Median column first, then a mean column, then an unplanned one
        let df = df!(
            "b" => &[Some(1.0), None],
            "c" => &[Some(9.0), Some(9.0)],
            "a" => &[None, Some(2.0)],
        )
        .unwrap();

        let mut imputer = Imputer::new(plan());
        let result = imputer.fit_transform(&df).unwrap();

        let names: Vec<&str> = result
            .get_column_names()
            .into_iter()
            .map(|s| s.as_str())
            .collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_all_missing_column_is_an_error() {
        let df = df!(
            "a" => &[None::<f64>, None],
            "b" => &[Some(1.0), Some(2.0)],
        )
        .unwrap();

        let mut imputer = Imputer::new(plan());
        assert!(matches!(imputer.fit(&df), Err(ReportError::Imputation(_))));
    }

    #[test]
    fn test_count_missing() {
        let df = df!(
            "a" => &[Some(1.0), None, Some(f64::NAN)],
            "b" => &[None, Some(2.0), Some(3.0)],
        )
        .unwrap();
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(count_missing(&df, &cols).unwrap(), 3);
    }

    #[test]
    fn test_plan_groups() {
        let extended = plan().with_column("c", ImputeStrategy::Mean);
        let groups = extended.groups();
        assert_eq!(groups[&ImputeStrategy::Mean], vec!["a", "c"]);
        assert_eq!(groups[&ImputeStrategy::Median], vec!["b"]);
    }
}
