//! Data loading utilities

use crate::error::{ReportError, Result};
use ndarray::Array2;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Rows sampled for CSV schema inference
const INFER_SCHEMA_ROWS: usize = 1000;

/// Data loader for the tabular formats polars reads natively
#[derive(Debug, Clone, Default)]
pub struct DataLoader;

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self
    }

    /// Load a delimited text file
    pub fn load_csv(&self, path: &Path, delimiter: u8) -> Result<DataFrame> {
        let parse_opts = CsvParseOptions::default().with_separator(delimiter);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
            .with_parse_options(parse_opts)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()
            .map_err(|e| ReportError::Data(format!("{}: {}", path.display(), e)))
    }

    /// Load a Parquet file
    pub fn load_parquet(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;

        ParquetReader::new(file)
            .finish()
            .map_err(|e| ReportError::Data(format!("{}: {}", path.display(), e)))
    }

    /// Load a JSON array or, with `lines`, newline-delimited JSON
    pub fn load_json(&self, path: &Path, lines: bool) -> Result<DataFrame> {
        let file = File::open(path)?;
        let format = if lines { JsonFormat::JsonLines } else { JsonFormat::Json };

        JsonReader::new(file)
            .with_json_format(format)
            .finish()
            .map_err(|e| ReportError::Data(format!("{}: {}", path.display(), e)))
    }

    /// Detect file format from extension and load.
    ///
    /// Fails with [`ReportError::FileNotFound`] when the path does not resolve;
    /// parse failures are returned as they come out of the reader.
    pub fn load_auto(&self, path: &Path) -> Result<DataFrame> {
        if !path.is_file() {
            return Err(ReportError::FileNotFound(path.to_path_buf()));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let df = match ext.as_str() {
            "tsv" => self.load_csv(path, b'\t')?,
            "parquet" | "pq" => self.load_parquet(path)?,
            "json" => self.load_json(path, false)?,
            "jsonl" | "ndjson" => self.load_json(path, true)?,
            // Spreadsheets are consumed as CSV exports
            _ => self.load_csv(path, b',')?,
        };

        debug!(rows = df.height(), cols = df.width(), path = %path.display(), "Loaded table");
        Ok(df)
    }
}

/// Save DataFrames for auditing
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV with a header row
    pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| ReportError::Data(e.to_string()))
    }
}

/// Feature columns plus target, selected from a raw table
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Feature columns as Float64, in `feature_names` order
    pub features: DataFrame,
    /// Target column as read from the file
    pub target: Column,
    /// Model column order
    pub feature_names: Vec<String>,
}

impl Dataset {
    /// Select the named features and target from a raw table.
    ///
    /// Feature columns are cast to Float64; cells that do not parse become
    /// missing. Rows with a missing target are rejected.
    pub fn from_frame(df: &DataFrame, feature_names: &[String], target_name: &str) -> Result<Self> {
        let columns = feature_names
            .iter()
            .map(|name| {
                let column = df
                    .column(name)
                    .map_err(|_| ReportError::FeatureNotFound(name.clone()))?;
                Ok(column.cast(&DataType::Float64)?)
            })
            .collect::<Result<Vec<Column>>>()?;

        let target = df
            .column(target_name)
            .map_err(|_| ReportError::FeatureNotFound(target_name.to_string()))?
            .clone();

        if target.null_count() > 0 {
            return Err(ReportError::Data(format!(
                "target '{}' has {} missing values",
                target_name,
                target.null_count()
            )));
        }

        Ok(Self {
            features: DataFrame::new(columns)?,
            target,
            feature_names: feature_names.to_vec(),
        })
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.features.height()
    }

    /// Number of features
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Replace the feature frame, keeping the model column order
    pub fn with_features(mut self, features: DataFrame) -> Result<Self> {
        if features.height() != self.target.len() {
            return Err(ReportError::Shape {
                expected: format!("{} rows", self.target.len()),
                actual: format!("{} rows", features.height()),
            });
        }
        self.features = features.select(self.feature_names.iter().map(String::as_str))?;
        Ok(self)
    }

    /// Row-major feature matrix; missing cells are NaN
    pub fn feature_matrix(&self) -> Result<Array2<f64>> {
        columns_to_array2(&self.features, &self.feature_names)
    }

    /// Features followed by the target column
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut df = self.features.clone();
        df.with_column(self.target.clone())?;
        Ok(df)
    }
}

/// Extract named columns from a DataFrame into a row-major `Array2<f64>`.
/// Nulls become NaN.
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            let column = df
                .column(col_name)
                .map_err(|_| ReportError::FeatureNotFound(col_name.clone()))?;
            let column = column.cast(&DataType::Float64)?;
            let values: Vec<f64> = column
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            Ok(values)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile()
            .unwrap();
        writeln!(file, "a,b,label").unwrap();
        writeln!(file, "1,2.5,0").unwrap();
        writeln!(file, "4,,1").unwrap();
        writeln!(file, "7,8.5,1").unwrap();
        file
    }

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_auto_csv() {
        let file = create_test_csv();
        let df = DataLoader::new().load_auto(file.path()).unwrap();

        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_missing_file_is_file_not_found() {
        let err = DataLoader::new()
            .load_auto(Path::new("definitely/not/here.csv"))
            .unwrap_err();
        assert!(matches!(err, ReportError::FileNotFound(_)));
    }

    #[test]
    fn test_dataset_selection_and_matrix() {
        let file = create_test_csv();
        let df = DataLoader::new().load_auto(file.path()).unwrap();

        // Reversed order must be honoured
        let dataset = Dataset::from_frame(&df, &names(&["b", "a"]), "label").unwrap();
        let x = dataset.feature_matrix().unwrap();

        assert_eq!(x.dim(), (3, 2));
        assert_eq!(x[[0, 0]], 2.5);
        assert_eq!(x[[0, 1]], 1.0);
        assert!(x[[1, 0]].is_nan());
    }

    #[test]
    fn test_missing_feature_column() {
        let file = create_test_csv();
        let df = DataLoader::new().load_auto(file.path()).unwrap();

        let err = Dataset::from_frame(&df, &names(&["a", "HbA1c"]), "label").unwrap_err();
        assert!(matches!(err, ReportError::FeatureNotFound(ref name) if name == "HbA1c"));
    }

    #[test]
    fn test_save_csv_round_trip() {
        let file = create_test_csv();
        let df = DataLoader::new().load_auto(file.path()).unwrap();
        let dataset = Dataset::from_frame(&df, &names(&["a", "b"]), "label").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("audit.csv");
        let mut frame = dataset.to_frame().unwrap();
        DataSaver::save_csv(&mut frame, &out).unwrap();

        let loaded = DataLoader::new().load_auto(&out).unwrap();
        assert_eq!(loaded.height(), 3);
        let cols: Vec<String> = loaded
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(cols, names(&["a", "b", "label"]));
    }
}
