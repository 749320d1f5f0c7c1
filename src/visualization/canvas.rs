//! Drawing backends, colours and text styles shared by every plot

use super::RenderConfig;
use crate::error::{ReportError, Result};
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::Path;

/// Colour of positive attributions
pub const POSITIVE: RGBColor = RGBColor(255, 0, 81);
/// Colour of negative attributions
pub const NEGATIVE: RGBColor = RGBColor(0, 139, 251);
pub const AXIS_GREY: RGBColor = RGBColor(150, 150, 150);

/// A figure that can be drawn on any plotters backend
pub trait Plot {
    /// Width and height in pixels
    fn size(&self) -> (u32, u32);

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()>;
}

pub(crate) fn render_err<E: std::fmt::Display>(err: E) -> ReportError {
    ReportError::Render(err.to_string())
}

/// Image formats a figure can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureFormat {
    Svg,
    /// Needs the `ttf` feature; without a font backend plotters cannot draw text on bitmaps
    Png,
}

/// Whether this build carries a font backend for bitmap text
pub const BITMAP_TEXT: bool = cfg!(feature = "ttf");

/// Figure format named by the path's extension
pub fn figure_format(path: &Path) -> Result<FigureFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "svg" => Ok(FigureFormat::Svg),
        "png" if BITMAP_TEXT => Ok(FigureFormat::Png),
        "png" => Err(ReportError::Render(format!(
            "{}: PNG figures need the `ttf` feature, use .svg or rebuild with --features ttf",
            path.display()
        ))),
        other => Err(ReportError::Render(format!(
            "unsupported image format '{}' for {}",
            other,
            path.display()
        ))),
    }
}

/// Draw `plot` into a file, picking the backend from the extension.
///
/// The drawing area is created and dropped inside this call.
pub fn save_plot<P: Plot>(plot: &P, path: &Path) -> Result<()> {
    let format = figure_format(path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match format {
        FigureFormat::Svg => {
            let root = SVGBackend::new(path, plot.size()).into_drawing_area();
            plot.draw(&root)?;
            root.present().map_err(render_err)?;
        }
        FigureFormat::Png => {
            let root = BitMapBackend::new(path, plot.size()).into_drawing_area();
            plot.draw(&root)?;
            root.present().map_err(render_err)?;
        }
    }

    Ok(())
}

/// Draw `plot` into an in-memory SVG document
pub fn render_svg_string<P: Plot>(plot: &P) -> Result<String> {
    let mut buffer = String::new();
    {
        let root = SVGBackend::with_string(&mut buffer, plot.size()).into_drawing_area();
        plot.draw(&root)?;
        root.present().map_err(render_err)?;
    }
    Ok(buffer)
}

/// Blue to red ramp used for feature values, `t` in [0, 1]
pub fn value_color(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(
        lerp(NEGATIVE.0, POSITIVE.0),
        lerp(NEGATIVE.1, POSITIVE.1),
        lerp(NEGATIVE.2, POSITIVE.2),
    )
}

impl RenderConfig {
    pub(crate) fn text(&self, size: u32) -> TextStyle<'_> {
        (self.font_family.as_str(), size).into_font().color(&BLACK)
    }

    pub(crate) fn label(&self) -> TextStyle<'_> {
        self.text(self.font_size)
    }

    pub(crate) fn small(&self) -> TextStyle<'_> {
        self.text(self.font_size.saturating_sub(3).max(8))
    }

    pub(crate) fn anchored(&self, size: u32, h: HPos, v: VPos) -> TextStyle<'_> {
        self.text(size).pos(Pos::new(h, v))
    }
}

/// Format a value the way the plots label numbers
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e6 {
        format!("{}", value as i64)
    } else {
        format!("{:.3}", value)
    }
}

/// Signed contribution label
pub fn format_signed(value: f64) -> String {
    format!("{:+.3}", value)
}

/// Coordinates of the lane charts: continuous x, lane `i` centred on y = i
pub(crate) type LaneCoord = Cartesian2d<RangedCoordf64, RangedCoordf64>;

/// Write one name per lane, right-aligned just left of `x` (normally the
/// left edge of the plotting range)
pub(crate) fn draw_lane_labels<DB: DrawingBackend>(
    chart: &ChartContext<'_, DB, LaneCoord>,
    area: &DrawingArea<DB, Shift>,
    names: &[String],
    x: f64,
    style: &TextStyle,
) -> Result<()> {
    let (base_x, base_y) = area.get_base_pixel();
    for (lane, name) in names.iter().enumerate() {
        let (px, py) = chart.backend_coord(&(x, lane as f64));
        area.draw_text(name, style, (px - base_x - 8, py - base_y))
            .map_err(render_err)?;
    }
    Ok(())
}

/// Padded range covering every value
pub fn padded_range(values: impl IntoIterator<Item = f64>, pad_fraction: f64) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if !lo.is_finite() {
        return (-1.0, 1.0);
    }

    let span = (hi - lo).abs().max(1e-9);
    (lo - span * pad_fraction, hi + span * pad_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_color_endpoints() {
        assert_eq!(value_color(0.0), NEGATIVE);
        assert_eq!(value_color(1.0), POSITIVE);
        assert_eq!(value_color(f64::NAN), value_color(0.5));
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range([0.0, 10.0], 0.1), (-1.0, 11.0));
        assert_eq!(padded_range(Vec::<f64>::new(), 0.1), (-1.0, 1.0));
        let (lo, hi) = padded_range([2.0, 2.0], 0.0);
        assert!(lo <= 2.0 && hi >= 2.0);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(3.0), "3");
        assert_eq!(format_value(0.12345), "0.123");
        assert_eq!(format_value(f64::NAN), "");
        assert_eq!(format_signed(0.5), "+0.500");
    }

    #[test]
    fn test_figure_format_by_extension() {
        assert_eq!(figure_format(Path::new("a/summary.SVG")).unwrap(), FigureFormat::Svg);
        assert!(figure_format(Path::new("summary")).is_err());
        assert_eq!(figure_format(Path::new("summary.png")).is_ok(), BITMAP_TEXT);
    }

    #[test]
    fn test_unsupported_extension() {
        struct Empty;
        impl Plot for Empty {
            fn size(&self) -> (u32, u32) {
                (10, 10)
            }
            fn draw<DB: DrawingBackend>(&self, _root: &DrawingArea<DB, Shift>) -> Result<()> {
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let err = save_plot(&Empty, &dir.path().join("plot.gif")).unwrap_err();
        assert!(matches!(err, ReportError::Render(_)));
    }
}
