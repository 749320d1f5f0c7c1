//! Global summary figures over all attributed rows

use super::canvas::{self, render_err, Plot, AXIS_GREY, NEGATIVE};
use super::RenderConfig;
use crate::error::Result;
use crate::explainability::{importance_order, mean_abs};
use ndarray::Array2;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, VPos};

const LEGEND_WIDTH: i32 = 90;
const MAX_JITTER: f64 = 0.4;

/// Beeswarm of every row's attribution, one lane per feature
pub(crate) struct SummaryPlot<'a> {
    pub values: &'a Array2<f64>,
    pub features: &'a Array2<f64>,
    pub names: &'a [String],
    pub config: &'a RenderConfig,
}

/// Mean |SHAP| per feature
pub(crate) struct SummaryBarPlot<'a> {
    pub values: &'a Array2<f64>,
    pub names: &'a [String],
    pub config: &'a RenderConfig,
}

/// Features shown, most important last so it lands at the top of the chart
fn displayed_features(values: &Array2<f64>, max_display: usize) -> Vec<usize> {
    let mut order = importance_order(values);
    order.truncate(max_display.max(1));
    order.reverse();
    order
}

/// Vertical offsets that spread points sharing similar x positions.
///
/// Points are binned along x; inside a bin they alternate above and below the
/// lane centre, growing outwards.
pub(crate) fn swarm_offsets(xs: &[f64], n_bins: usize) -> Vec<f64> {
    let (lo, hi) = canvas::padded_range(xs.iter().copied(), 0.0);
    let width = (hi - lo) / n_bins.max(1) as f64;

    let mut order: Vec<usize> = (0..xs.len()).collect();
    order.sort_by(|&a, &b| xs[a].partial_cmp(&xs[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut offsets = vec![0.0; xs.len()];
    let mut bin_fill: Vec<usize> = vec![0; n_bins.max(1) + 1];
    let step = MAX_JITTER / 8.0;

    for idx in order {
        let bin = if width > 0.0 {
            (((xs[idx] - lo) / width) as usize).min(bin_fill.len() - 1)
        } else {
            0
        };
        let k = bin_fill[bin];
        bin_fill[bin] += 1;

        let magnitude = ((k + 1) / 2) as f64 * step;
        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
        offsets[idx] = (sign * magnitude).clamp(-MAX_JITTER, MAX_JITTER);
    }

    offsets
}

/// Min-max scale of one feature column; constant columns map to the middle
fn normalise(column: &[f64]) -> Vec<f64> {
    let (lo, hi) = column
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    column
        .iter()
        .map(|&v| if hi > lo { (v - lo) / (hi - lo) } else { 0.5 })
        .collect()
}

impl Plot for SummaryPlot<'_> {
    fn size(&self) -> (u32, u32) {
        self.config.summary_size
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        root.fill(&WHITE).map_err(render_err)?;

        let (width, _) = root.dim_in_pixel();
        let (plot_area, legend_area) = root.split_horizontally(width as i32 - LEGEND_WIDTH);

        let shown = displayed_features(self.values, self.config.max_display);
        let lane_names: Vec<String> = shown.iter().map(|&f| self.names[f].clone()).collect();
        let n_lanes = shown.len() as f64;

        let (x_min, x_max) = canvas::padded_range(self.values.iter().copied(), 0.05);

        let mut chart = ChartBuilder::on(&plot_area)
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(self.config.y_label_width)
            .build_cartesian_2d(x_min..x_max, -0.5..(n_lanes - 0.5))
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .disable_y_axis()
            .x_labels(7)
            .x_desc("SHAP value (impact on model output)")
            .label_style(self.config.label())
            .axis_desc_style(self.config.label())
            .draw()
            .map_err(render_err)?;

        let name_style = self.config.anchored(self.config.font_size, HPos::Right, VPos::Center);
        canvas::draw_lane_labels(&chart, &plot_area, &lane_names, x_min, &name_style)?;

        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(0.0, -0.5), (0.0, n_lanes - 0.5)],
                AXIS_GREY.stroke_width(1),
            )))
            .map_err(render_err)?;

        for (lane, &feature) in shown.iter().enumerate() {
            let xs: Vec<f64> = self.values.column(feature).to_vec();
            let column: Vec<f64> = self.features.column(feature).to_vec();
            let colours = normalise(&column);
            let offsets = swarm_offsets(&xs, 100);

            chart
                .draw_series(xs.iter().zip(&offsets).zip(&colours).map(|((&x, &dy), &t)| {
                    Circle::new(
                        (x, lane as f64 + dy),
                        self.config.point_size,
                        canvas::value_color(t).mix(0.85).filled(),
                    )
                }))
                .map_err(render_err)?;
        }

        draw_colour_bar(&legend_area, self.config)
    }
}

/// Vertical gradient from low (blue) to high (red) feature values
fn draw_colour_bar<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, config: &RenderConfig) -> Result<()> {
    let (_, height) = area.dim_in_pixel();
    let top = 40i32;
    let bottom = height as i32 - 70;
    let steps = 64;
    let span = (bottom - top).max(steps);

    for i in 0..steps {
        let y0 = top + span * i / steps;
        let y1 = top + span * (i + 1) / steps;
        let t = 1.0 - i as f64 / (steps - 1) as f64;
        area.draw(&Rectangle::new([(10, y0), (24, y1)], canvas::value_color(t).filled()))
            .map_err(render_err)?;
    }

    let style = config.anchored(config.font_size.saturating_sub(2).max(8), HPos::Left, VPos::Center);
    area.draw_text("High", &style, (30, top)).map_err(render_err)?;
    area.draw_text("Low", &style, (30, top + span)).map_err(render_err)?;
    area.draw_text("Feature value", &style, (30, top + span / 2))
        .map_err(render_err)?;

    Ok(())
}

impl Plot for SummaryBarPlot<'_> {
    fn size(&self) -> (u32, u32) {
        self.config.summary_size
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        root.fill(&WHITE).map_err(render_err)?;

        let importance = mean_abs(self.values);
        let shown = displayed_features(self.values, self.config.max_display);
        let lane_names: Vec<String> = shown.iter().map(|&f| self.names[f].clone()).collect();
        let n_lanes = shown.len() as f64;

        let x_max = shown
            .iter()
            .map(|&f| importance[f])
            .fold(0.0, f64::max)
            .max(1e-9)
            * 1.15;

        let mut chart = ChartBuilder::on(root)
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(self.config.y_label_width)
            .build_cartesian_2d(0.0..x_max, -0.5..(n_lanes - 0.5))
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .disable_y_axis()
            .x_labels(6)
            .x_desc("mean(|SHAP value|) (average impact on model output magnitude)")
            .label_style(self.config.label())
            .axis_desc_style(self.config.label())
            .draw()
            .map_err(render_err)?;

        let name_style = self.config.anchored(self.config.font_size, HPos::Right, VPos::Center);
        canvas::draw_lane_labels(&chart, root, &lane_names, 0.0, &name_style)?;

        chart
            .draw_series(shown.iter().enumerate().map(|(lane, &f)| {
                let y = lane as f64;
                Rectangle::new([(0.0, y - 0.35), (importance[f], y + 0.35)], NEGATIVE.filled())
            }))
            .map_err(render_err)?;

        let value_style = self.config.anchored(
            self.config.font_size.saturating_sub(3).max(8),
            HPos::Left,
            VPos::Center,
        );
        chart
            .draw_series(shown.iter().enumerate().map(|(lane, &f)| {
                Text::new(
                    format!("{:.3}", importance[f]),
                    (importance[f] + x_max * 0.01, lane as f64),
                    value_style.clone(),
                )
            }))
            .map_err(render_err)?;

        Ok(())
    }
}
