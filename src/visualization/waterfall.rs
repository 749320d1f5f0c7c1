//! Waterfall of one row: from the base value to the model output

use super::canvas::{self, render_err, Plot, AXIS_GREY, NEGATIVE, POSITIVE};
use super::RenderConfig;
use crate::error::Result;
use crate::explainability::{Explanation, FeatureContribution};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, VPos};

/// One bar; `start` is the running output before this contribution
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WaterfallRow {
    pub label: String,
    pub value: f64,
    pub start: f64,
}

impl WaterfallRow {
    pub fn end(&self) -> f64 {
        self.start + self.value
    }
}

/// Bars from bottom to top. The largest contributions sit at the top; past
/// `max_display` the smallest ones collapse into a single "other features" bar.
pub(crate) fn waterfall_rows(explanation: &Explanation, max_display: usize) -> Vec<WaterfallRow> {
    let sorted = explanation.sorted_contributions();
    let max_display = max_display.max(1);

    let mut labelled: Vec<(String, f64)> = Vec::with_capacity(max_display);
    if sorted.len() > max_display {
        let (kept, rest) = sorted.split_at(max_display - 1);
        labelled.extend(kept.iter().map(|c| (row_label(c), c.contribution)));
        labelled.push((
            format!("{} other features", rest.len()),
            rest.iter().map(|c| c.contribution).sum(),
        ));
    } else {
        labelled.extend(sorted.iter().map(|c| (row_label(c), c.contribution)));
    }

    let mut running = explanation.base_value;
    labelled
        .into_iter()
        .rev()
        .map(|(label, value)| {
            let row = WaterfallRow {
                label,
                value,
                start: running,
            };
            running += value;
            row
        })
        .collect()
}

fn row_label(c: &FeatureContribution) -> String {
    format!("{} = {}", canvas::format_value(c.feature_value), c.feature_name)
}

pub(crate) struct WaterfallPlot<'a> {
    pub explanation: &'a Explanation,
    pub config: &'a RenderConfig,
}

impl Plot for WaterfallPlot<'_> {
    fn size(&self) -> (u32, u32) {
        self.config.waterfall_size
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        root.fill(&WHITE).map_err(render_err)?;

        let rows = waterfall_rows(self.explanation, self.config.waterfall_max_display);
        let labels: Vec<String> = rows.iter().map(|r| r.label.clone()).collect();
        let n = rows.len() as f64;
        let base = self.explanation.base_value;
        let output = self.explanation.prediction();

        let (x_min, x_max) = canvas::padded_range(
            rows.iter()
                .flat_map(|r| [r.start, r.end()])
                .chain([base, output]),
            0.15,
        );

        let mut chart = ChartBuilder::on(root)
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(self.config.y_label_width)
            .build_cartesian_2d(x_min..x_max, -1.0..(n + 0.2))
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .disable_y_axis()
            .x_labels(7)
            .label_style(self.config.label())
            .axis_desc_style(self.config.label())
            .draw()
            .map_err(render_err)?;

        let name_style = self.config.anchored(self.config.font_size, HPos::Right, VPos::Center);
        canvas::draw_lane_labels(&chart, root, &labels, x_min, &name_style)?;

        // Reference ticks tying the base value and the output to their bars
        chart
            .draw_series([
                PathElement::new(vec![(base, -0.6), (base, -0.35)], AXIS_GREY.stroke_width(1)),
                PathElement::new(vec![(output, n - 0.65), (output, n - 0.3)], AXIS_GREY.stroke_width(1)),
            ])
            .map_err(render_err)?;

        chart
            .draw_series(rows.iter().enumerate().map(|(i, row)| {
                let y = i as f64;
                let colour = if row.value >= 0.0 { POSITIVE } else { NEGATIVE };
                Rectangle::new([(row.start, y - 0.35), (row.end(), y + 0.35)], colour.filled())
            }))
            .map_err(render_err)?;

        // Connectors between consecutive bars
        chart
            .draw_series(rows.iter().enumerate().skip(1).map(|(i, row)| {
                let y = i as f64;
                PathElement::new(
                    vec![(row.start, y - 0.65), (row.start, y - 0.35)],
                    AXIS_GREY.stroke_width(1),
                )
            }))
            .map_err(render_err)?;

        let value_size = self.config.font_size.saturating_sub(3).max(8);
        let right = self.config.anchored(value_size, HPos::Left, VPos::Center);
        let left = self.config.anchored(value_size, HPos::Right, VPos::Center);
        let pad = (x_max - x_min) * 0.01;
        chart
            .draw_series(rows.iter().enumerate().map(|(i, row)| {
                let (x, style) = if row.value >= 0.0 {
                    (row.end() + pad, right.clone())
                } else {
                    (row.end() - pad, left.clone())
                };
                Text::new(canvas::format_signed(row.value), (x, i as f64), style)
            }))
            .map_err(render_err)?;

        let centred = self.config.anchored(self.config.font_size, HPos::Center, VPos::Center);
        chart
            .draw_series([
                Text::new(format!("E[f(X)] = {:.3}", base), (base, -0.8), centred.clone()),
                Text::new(format!("f(x) = {:.3}", output), (output, n - 0.1), centred),
            ])
            .map_err(render_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn explanation() -> Explanation {
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let values = array![[0.3, -0.1, 0.05, -0.2]];
        let data = array![[1.0, 2.5, 3.0, 4.0]];
        Explanation::from_row(&values, &data, 0, 0.4, &names).unwrap()
    }

    #[test]
    fn test_rows_end_at_prediction() {
        let e = explanation();
        let rows = waterfall_rows(&e, 10);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].start, 0.4);
        assert!((rows[3].end() - e.prediction()).abs() < 1e-12);
        // Largest contribution on top
        assert_eq!(rows[3].label, "1 = a");
        assert_eq!(rows[0].label, "3 = c");
    }

    #[test]
    fn test_small_contributions_collapse() {
        let e = explanation();
        let rows = waterfall_rows(&e, 3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].label, "2 other features");
        assert!((rows[0].value - (-0.1 + 0.05)).abs() < 1e-12);
        assert!((rows[2].end() - e.prediction()).abs() < 1e-12);
    }
}
