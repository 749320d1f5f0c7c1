//! Visualization module
//!
//! Renders attribution figures with plotters and captures the force page
//! through a headless browser:
//! - Summary beeswarm and summary bar plots over all attributed rows
//! - Force plot webpage and waterfall plot for one row
//! - Best-effort screenshot of the force page

mod canvas;
mod force;
mod screenshot;
mod summary;
mod waterfall;

pub use canvas::{figure_format, save_plot, FigureFormat, Plot, BITMAP_TEXT};
pub use screenshot::{HeadlessBrowser, NoopRasterizer, PageRasterizer, ScreenshotConfig};

use crate::error::{ReportError, Result};
use crate::explainability::Explanation;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Presentation settings, owned by the renderer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub font_family: String,
    pub font_size: u32,
    /// Pixel size of the summary and bar plots
    pub summary_size: (u32, u32),
    pub waterfall_size: (u32, u32),
    /// Pixel size of the force bar embedded in the webpage
    pub force_size: (u32, u32),
    /// Features shown in the summary plots
    pub max_display: usize,
    /// Bars shown in the waterfall before the rest are grouped
    pub waterfall_max_display: usize,
    /// Width reserved for feature names
    pub y_label_width: u32,
    /// Beeswarm point radius
    pub point_size: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_family: "Times New Roman".to_string(),
            font_size: 16,
            summary_size: (800, 1000),
            waterfall_size: (1000, 700),
            force_size: (1200, 260),
            max_display: 20,
            waterfall_max_display: 10,
            y_label_width: 220,
            point_size: 4,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.font_family.trim().is_empty() {
            return Err(ReportError::Config("font family is empty".to_string()));
        }

        for (name, (w, h)) in [
            ("summary_size", self.summary_size),
            ("waterfall_size", self.waterfall_size),
            ("force_size", self.force_size),
        ] {
            if w < 200 || h < 150 {
                return Err(ReportError::Config(format!(
                    "{} {}x{} is too small to draw on",
                    name, w, h
                )));
            }
        }

        if self.y_label_width >= self.summary_size.0 / 2 || self.y_label_width >= self.waterfall_size.0 / 2 {
            return Err(ReportError::Config(format!(
                "y_label_width {} leaves no room for the plot",
                self.y_label_width
            )));
        }

        if self.max_display == 0 || self.waterfall_max_display == 0 {
            return Err(ReportError::Config("max_display must be positive".to_string()));
        }

        Ok(())
    }
}

/// Writes every figure of the report
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Beeswarm of attributions coloured by feature value
    pub fn summary_plot(
        &self,
        values: &Array2<f64>,
        features: &Array2<f64>,
        names: &[String],
        path: &Path,
    ) -> Result<()> {
        check_matrix(values, names)?;
        if features.dim() != values.dim() {
            return Err(ReportError::Shape {
                expected: format!("{:?}", values.dim()),
                actual: format!("{:?}", features.dim()),
            });
        }

        save_plot(
            &summary::SummaryPlot {
                values,
                features,
                names,
                config: &self.config,
            },
            path,
        )?;
        info!(path = %path.display(), "Saved summary plot");
        Ok(())
    }

    /// Mean |SHAP| per feature
    pub fn summary_bar_plot(&self, values: &Array2<f64>, names: &[String], path: &Path) -> Result<()> {
        check_matrix(values, names)?;

        save_plot(
            &summary::SummaryBarPlot {
                values,
                names,
                config: &self.config,
            },
            path,
        )?;
        info!(path = %path.display(), "Saved summary bar plot");
        Ok(())
    }

    /// Standalone HTML force plot for one row
    pub fn force_plot_html(&self, explanation: &Explanation, path: &Path) -> Result<()> {
        let page = force::force_page(explanation, &self.config)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, page)?;
        info!(path = %path.display(), "Saved force plot page");
        Ok(())
    }

    /// Waterfall from the base value to the model output for one row
    pub fn waterfall_plot(&self, explanation: &Explanation, path: &Path) -> Result<()> {
        save_plot(
            &waterfall::WaterfallPlot {
                explanation,
                config: &self.config,
            },
            path,
        )?;
        info!(path = %path.display(), "Saved waterfall plot");
        Ok(())
    }
}

fn check_matrix(values: &Array2<f64>, names: &[String]) -> Result<()> {
    if values.ncols() != names.len() {
        return Err(ReportError::Shape {
            expected: format!("{} feature columns", names.len()),
            actual: format!("{} columns", values.ncols()),
        });
    }
    if values.nrows() == 0 || values.ncols() == 0 {
        return Err(ReportError::Render("nothing to plot".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names() -> Vec<String> {
        vec!["DR".to_string(), "HbA1c".to_string(), "Age".to_string()]
    }

    fn values() -> Array2<f64> {
        array![[0.1, -0.2, 0.05], [-0.05, 0.3, 0.0], [0.2, -0.1, -0.02]]
    }

    fn features() -> Array2<f64> {
        array![[1.0, 6.5, 50.0], [0.0, 8.1, 61.0], [2.0, 7.0, 45.0]]
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RenderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_tiny_figure_rejected() {
        let config = RenderConfig {
            force_size: (100, 50),
            ..RenderConfig::default()
        };
        assert!(matches!(config.validate(), Err(ReportError::Config(_))));
    }

    #[test]
    fn test_render_twice_is_independent() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::default();
        let first = dir.path().join("first.svg");
        let second = dir.path().join("second.svg");

        renderer.summary_plot(&values(), &features(), &names(), &first).unwrap();
        renderer.summary_plot(&values(), &features(), &names(), &second).unwrap();

        let a = std::fs::read_to_string(&first).unwrap();
        let b = std::fs::read_to_string(&second).unwrap();
        assert!(a.contains("<svg"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_figures_written() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::default();
        let explanation = Explanation::from_row(&values(), &features(), 1, 0.4, &names()).unwrap();

        let paths = [
            dir.path().join("summary.svg"),
            dir.path().join("bar.svg"),
            dir.path().join("force.html"),
            dir.path().join("waterfall.svg"),
            dir.path().join("nested/waterfall.svg"),
        ];
        renderer.summary_plot(&values(), &features(), &names(), &paths[0]).unwrap();
        renderer.summary_bar_plot(&values(), &names(), &paths[1]).unwrap();
        renderer.force_plot_html(&explanation, &paths[2]).unwrap();
        renderer.waterfall_plot(&explanation, &paths[3]).unwrap();
        renderer.waterfall_plot(&explanation, &paths[4]).unwrap();

        for path in &paths {
            let len = std::fs::metadata(path).unwrap().len();
            assert!(len > 0, "{} is empty", path.display());
        }
    }

    #[test]
    fn test_every_lane_is_labelled() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::default();
        let names: Vec<String> = ["DR", "Duration of DM", "HbA1c", "Serum creatinine", "TC", "Age", "SBP"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let values = Array2::from_shape_fn((6, names.len()), |(i, j)| {
            (j as f64 + 1.0) * 0.03 * if (i + j) % 2 == 0 { 1.0 } else { -1.0 }
        });
        let features = Array2::from_shape_fn((6, names.len()), |(i, j)| (i * 3 + j) as f64);
        let explanation = Explanation::from_row(&values, &features, 2, 0.4, &names).unwrap();

        let summary = dir.path().join("summary.svg");
        let bar = dir.path().join("bar.svg");
        let waterfall = dir.path().join("waterfall.svg");
        renderer.summary_plot(&values, &features, &names, &summary).unwrap();
        renderer.summary_bar_plot(&values, &names, &bar).unwrap();
        renderer.waterfall_plot(&explanation, &waterfall).unwrap();

        for path in [&summary, &bar, &waterfall] {
            let svg = std::fs::read_to_string(path).unwrap();
            for name in &names {
                assert!(svg.contains(name.as_str()), "{} has no lane for {}", path.display(), name);
            }
        }
    }

    #[cfg(feature = "ttf")]
    #[test]
    fn test_every_figure_renders_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::new(RenderConfig {
            font_family: "sans-serif".to_string(),
            ..RenderConfig::default()
        });
        let explanation = Explanation::from_row(&values(), &features(), 1, 0.4, &names()).unwrap();

        let paths = [
            dir.path().join("summary.png"),
            dir.path().join("bar.png"),
            dir.path().join("waterfall.png"),
        ];
        renderer.summary_plot(&values(), &features(), &names(), &paths[0]).unwrap();
        renderer.summary_bar_plot(&values(), &names(), &paths[1]).unwrap();
        renderer.waterfall_plot(&explanation, &paths[2]).unwrap();

        for path in &paths {
            let bytes = std::fs::read(path).unwrap();
            assert!(bytes.starts_with(b"\x89PNG"), "{} is not a PNG", path.display());
        }
    }

    #[cfg(not(feature = "ttf"))]
    #[test]
    fn test_png_rejected_without_font_backend() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::default();
        let explanation = Explanation::from_row(&values(), &features(), 1, 0.4, &names()).unwrap();

        let summary = dir.path().join("summary.png");
        let bar = dir.path().join("bar.png");
        let waterfall = dir.path().join("nested/waterfall.png");
        let results = [
            renderer.summary_plot(&values(), &features(), &names(), &summary),
            renderer.summary_bar_plot(&values(), &names(), &bar),
            renderer.waterfall_plot(&explanation, &waterfall),
        ];

        for result in results {
            assert!(matches!(result, Err(ReportError::Render(_))));
        }
        assert!(!summary.exists());
        assert!(!bar.exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_mismatched_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::default();
        let err = renderer
            .summary_bar_plot(&values(), &names()[..2], &dir.path().join("bar.svg"))
            .unwrap_err();
        assert!(matches!(err, ReportError::Shape { .. }));
    }
}
