//! Integration test: Full pipeline (load → impute → split → train → explain → render)

use shap_report::config::{ReportConfig, DEFAULT_FEATURES, DEFAULT_TARGET};
use shap_report::pipeline::ReportPipeline;
use shap_report::visualization::PageRasterizer;
use shap_report::{BrowserError, ReportError};
use std::io::Write;
use std::path::Path;

/// Two-class table with a handful of gaps, one row per patient
fn write_clinical_table(path: &Path, n: usize) {
    let mut file = std::fs::File::create(path).unwrap();
    let mut header: Vec<String> = DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect();
    header.push(DEFAULT_TARGET.to_string());
    writeln!(file, "{}", header.join(",")).unwrap();

    for i in 0..n {
        let label = if i % 5 < 2 { 2 } else { 1 };
        let shift = if label == 2 { 3.0 } else { 0.0 };
        let mut cells: Vec<String> = (0..DEFAULT_FEATURES.len())
            .map(|j| format!("{:.2}", ((i * 13 + j * 7) % 19) as f64 * 0.5 + shift * (j % 3) as f64))
            .collect();
        if i % 11 == 4 {
            cells[0] = String::new();
        }
        if i % 9 == 2 {
            cells[5] = String::new();
        }
        cells.push(label.to_string());
        writeln!(file, "{}", cells.join(",")).unwrap();
    }
}

fn test_config(dir: &Path) -> ReportConfig {
    let data = dir.join("test1.csv");
    write_clinical_table(&data, 60);

    let mut config = ReportConfig::default()
        .with_data_path(data)
        .with_output_dir(dir.join("out"))
        .with_n_estimators(12);
    config.screenshot.enabled = false;
    config
}

/// Rasterizer whose driver always fails
struct BrokenDriver;

impl PageRasterizer for BrokenDriver {
    fn rasterize(&self, _html: &Path, _output: &Path) -> Result<(), BrowserError> {
        Err(BrowserError::Driver("session not created".to_string()))
    }
}

/// Rasterizer that writes a placeholder image
struct FakeBrowser;

impl PageRasterizer for FakeBrowser {
    fn rasterize(&self, html: &Path, output: &Path) -> Result<(), BrowserError> {
        assert!(html.is_file());
        std::fs::write(output, b"\x89PNG").map_err(|e| BrowserError::Other(e.to_string()))
    }
}

#[test]
fn test_full_report_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let artifacts = ReportPipeline::new(config).run().unwrap();

    assert_eq!(artifacts.classes, vec!["1".to_string(), "2".to_string()]);
    assert_eq!(artifacts.n_test, 12);
    assert_eq!(artifacts.n_train, 48);
    assert!(artifacts.metrics.accuracy >= 0.0 && artifacts.metrics.accuracy <= 1.0);
    assert!(artifacts.additivity_error.unwrap() < 1e-6);
    assert!(artifacts.force_image.is_none());

    for path in [
        &artifacts.processed_csv,
        &artifacts.summary_plot,
        &artifacts.summary_bar_plot,
        &artifacts.force_html,
        &artifacts.waterfall_plot,
    ] {
        assert!(path.is_file(), "missing {}", path.display());
        assert!(std::fs::metadata(path).unwrap().len() > 0);
    }

    let svg = std::fs::read_to_string(&artifacts.summary_plot).unwrap();
    assert!(svg.starts_with("<svg") || svg.starts_with("<?xml"));

    let page = std::fs::read_to_string(&artifacts.force_html).unwrap();
    assert!(page.contains("<svg"));
    assert!(page.contains("Duration of DM"));
}

#[test]
fn test_processed_table_has_no_missing_values() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let artifacts = ReportPipeline::new(config).run().unwrap();

    let text = std::fs::read_to_string(&artifacts.processed_csv).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("DR,Duration of DM"));
    assert_eq!(lines.clone().count(), 60);
    for line in lines {
        assert!(line.split(',').all(|cell| !cell.is_empty()), "gap in row: {}", line);
    }
}

#[test]
fn test_driver_failure_keeps_saved_figures() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.screenshot.enabled = true;

    let artifacts = ReportPipeline::new(config)
        .with_rasterizer(Box::new(BrokenDriver))
        .run()
        .unwrap();

    assert!(artifacts.force_image.is_none());
    assert!(artifacts.summary_plot.is_file());
    assert!(artifacts.summary_bar_plot.is_file());
    assert!(artifacts.force_html.is_file());
    assert!(artifacts.waterfall_plot.is_file());
}

#[test]
fn test_screenshot_is_recorded_when_captured() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.screenshot.enabled = true;

    let artifacts = ReportPipeline::new(config)
        .with_rasterizer(Box::new(FakeBrowser))
        .run()
        .unwrap();

    let image = artifacts.force_image.unwrap();
    assert!(image.ends_with("shap_force_plot.png"));
    assert!(image.is_file());
}

#[test]
fn test_same_seed_same_report() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let a = ReportPipeline::new(test_config(first.path())).run().unwrap();
    let b = ReportPipeline::new(test_config(second.path())).run().unwrap();

    assert_eq!(a.base_value, b.base_value);
    assert_eq!(a.sample_output, b.sample_output);
    assert_eq!(
        std::fs::read_to_string(&a.waterfall_plot).unwrap(),
        std::fs::read_to_string(&b.waterfall_plot).unwrap()
    );
}

#[test]
fn test_missing_data_file_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let config = ReportConfig::default()
        .with_data_path(dir.path().join("absent.csv"))
        .with_output_dir(dir.path());

    let result = ReportPipeline::new(config).run();
    assert!(matches!(result, Err(ReportError::FileNotFound(_))));
}

#[test]
fn test_sample_index_beyond_test_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path()).with_sample_index(12);

    let result = ReportPipeline::new(config).run();
    assert!(matches!(result, Err(ReportError::Config(_))));
}
