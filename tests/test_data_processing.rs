//! Integration tests: loading, imputation and label encoding

use shap_report::config::{DEFAULT_FEATURES, DEFAULT_TARGET};
use shap_report::preprocessing::{count_missing, ImputePlan, ImputeStrategy, Imputer, LabelEncoder};
use shap_report::utils::{DataLoader, DataSaver, Dataset};
use shap_report::ReportError;
use polars::prelude::*;
use std::io::Write;

fn feature_names() -> Vec<String> {
    DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect()
}

fn write_records(path: &std::path::Path, n: usize) {
    let mut file = std::fs::File::create(path).unwrap();
    let mut header: Vec<String> = feature_names();
    header.push(DEFAULT_TARGET.to_string());
    writeln!(file, "{}", header.join(",")).unwrap();

    for i in 0..n {
        let mut cells: Vec<String> = (0..DEFAULT_FEATURES.len())
            .map(|j| format!("{}", (i * (j + 1)) % 17))
            .collect();
        // A couple of gaps in DR (median) and HbA1c (mean)
        if i == 3 || i == 7 {
            cells[0] = String::new();
        }
        if i == 4 {
            cells[2] = String::new();
        }
        cells.push(if i % 3 == 0 { "2" } else { "1" }.to_string());
        writeln!(file, "{}", cells.join(",")).unwrap();
    }
}

#[test]
fn test_load_csv_and_select_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.csv");
    write_records(&path, 30);

    let raw = DataLoader::new().load_auto(&path).unwrap();
    assert_eq!(raw.height(), 30);
    assert_eq!(raw.width(), 11);

    let dataset = Dataset::from_frame(&raw, &feature_names(), DEFAULT_TARGET).unwrap();
    assert_eq!(dataset.n_rows(), 30);
    assert_eq!(dataset.n_features(), 10);
    assert_eq!(count_missing(&dataset.features, &dataset.feature_names).unwrap(), 3);
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.csv");

    let result = DataLoader::new().load_auto(&path);
    assert!(matches!(result, Err(ReportError::FileNotFound(p)) if p == path));
}

#[test]
fn test_missing_feature_column() {
    let df = df!(
        "DR" => &[1.0, 2.0],
        "Pathology type" => &["1", "2"],
    )
    .unwrap();

    let result = Dataset::from_frame(&df, &feature_names(), DEFAULT_TARGET);
    assert!(matches!(result, Err(ReportError::FeatureNotFound(name)) if name == "Duration of DM"));
}

#[test]
fn test_two_missing_values_take_observed_mean() {
    let df = df!(
        "HbA1c" => &[Some(6.0), None, Some(8.0), Some(10.0), None],
        "DR" => &[Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)],
    )
    .unwrap();

    let plan = ImputePlan::new()
        .with_column("HbA1c", ImputeStrategy::Mean)
        .with_column("DR", ImputeStrategy::Median);
    let mut imputer = Imputer::new(plan);
    let filled = imputer.fit_transform(&df).unwrap();

    let column: Vec<f64> = filled
        .column("HbA1c")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert_eq!(column, vec![6.0, 8.0, 8.0, 10.0, 8.0]);

    // Input column order is kept
    let names: Vec<&str> = filled.get_column_names().iter().map(|s| s.as_str()).collect();
    assert_eq!(names, vec!["HbA1c", "DR"]);
}

#[test]
fn test_imputed_dataset_has_no_gaps_and_round_trips_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.csv");
    write_records(&path, 20);

    let raw = DataLoader::new().load_auto(&path).unwrap();
    let dataset = Dataset::from_frame(&raw, &feature_names(), DEFAULT_TARGET).unwrap();

    let mut plan = ImputePlan::new();
    for name in &dataset.feature_names {
        let strategy = if name == "DR" { ImputeStrategy::Median } else { ImputeStrategy::Mean };
        plan = plan.with_column(name.clone(), strategy);
    }
    let mut imputer = Imputer::new(plan);
    let imputed = imputer.fit_transform(&dataset.features).unwrap();
    let dataset = dataset.with_features(imputed).unwrap();

    assert_eq!(count_missing(&dataset.features, &dataset.feature_names).unwrap(), 0);

    let out = dir.path().join("nested").join("processed.csv");
    DataSaver::save_csv(&mut dataset.to_frame().unwrap(), &out).unwrap();

    let reloaded = DataLoader::new().load_auto(&out).unwrap();
    assert_eq!(reloaded.height(), 20);
    assert_eq!(reloaded.width(), 11);
    assert_eq!(reloaded.get_column_names()[0].as_str(), "DR");
    assert_eq!(reloaded.get_column_names()[10].as_str(), DEFAULT_TARGET);
}

#[test]
fn test_label_encoder_numeric_order() {
    let target = Column::new("y".into(), &["10", "2", "2", "10", "3"]);
    let mut encoder = LabelEncoder::new();
    let labels = encoder.fit_transform(&target).unwrap();

    assert_eq!(encoder.classes(), &["2", "3", "10"]);
    assert_eq!(labels, vec![2, 0, 0, 2, 1]);
}
