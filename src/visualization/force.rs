//! Force plot of one row, written as a standalone webpage

use super::canvas::{self, render_err, Plot, AXIS_GREY, NEGATIVE, POSITIVE};
use super::RenderConfig;
use crate::error::Result;
use crate::explainability::{Explanation, FeatureContribution};
use chrono::Local;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, VPos};
use std::fmt::Write as _;

/// A labelled segment of the force bar
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ForceSegment {
    pub label: String,
    pub from: f64,
    pub to: f64,
    pub positive: bool,
}

/// Lay out the contributions around the output value.
///
/// Positive contributions stack up to f(x) from the left with the largest one
/// touching f(x); negative ones stack away from f(x) to the right.
pub(crate) fn force_segments(explanation: &Explanation) -> Vec<ForceSegment> {
    let output = explanation.prediction();
    let sorted = explanation.sorted_contributions();

    let mut segments = Vec::with_capacity(sorted.len());

    let mut cursor = output;
    for c in sorted.iter().filter(|c| c.contribution > 0.0) {
        segments.push(ForceSegment {
            label: segment_label(c),
            from: cursor - c.contribution,
            to: cursor,
            positive: true,
        });
        cursor -= c.contribution;
    }

    let mut cursor = output;
    for c in sorted.iter().filter(|c| c.contribution < 0.0) {
        segments.push(ForceSegment {
            label: segment_label(c),
            from: cursor,
            to: cursor - c.contribution,
            positive: false,
        });
        cursor -= c.contribution;
    }

    segments
}

fn segment_label(c: &FeatureContribution) -> String {
    format!("{} = {}", c.feature_name, canvas::format_value(c.feature_value))
}

pub(crate) struct ForcePlot<'a> {
    pub explanation: &'a Explanation,
    pub config: &'a RenderConfig,
}

impl Plot for ForcePlot<'_> {
    fn size(&self) -> (u32, u32) {
        self.config.force_size
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        root.fill(&WHITE).map_err(render_err)?;

        let segments = force_segments(self.explanation);
        let base = self.explanation.base_value;
        let output = self.explanation.prediction();

        let (x_min, x_max) = canvas::padded_range(
            segments
                .iter()
                .flat_map(|s| [s.from, s.to])
                .chain([base, output]),
            0.1,
        );
        let span = x_max - x_min;

        let mut chart = ChartBuilder::on(root)
            .margin(20)
            .x_label_area_size(30)
            .build_cartesian_2d(x_min..x_max, -1.6..1.6)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .disable_y_axis()
            .x_labels(9)
            .label_style(self.config.small())
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(segments.iter().map(|s| {
                let colour = if s.positive { POSITIVE } else { NEGATIVE };
                Rectangle::new([(s.from, -0.25), (s.to, 0.25)], colour.mix(0.9).filled())
            }))
            .map_err(render_err)?;

        // Thin white separators between neighbouring segments
        chart
            .draw_series(segments.iter().map(|s| {
                let edge = if s.positive { s.from } else { s.to };
                PathElement::new(vec![(edge, -0.25), (edge, 0.25)], WHITE.stroke_width(2))
            }))
            .map_err(render_err)?;

        // Only label segments wide enough to carry text
        let label_size = self.config.font_size.saturating_sub(3).max(8);
        let below = self.config.anchored(label_size, HPos::Center, VPos::Top);
        chart
            .draw_series(
                segments
                    .iter()
                    .filter(|s| (s.to - s.from) >= span * 0.04)
                    .enumerate()
                    .map(|(i, s)| {
                        let y = if i % 2 == 0 { -0.45 } else { -0.95 };
                        Text::new(s.label.clone(), ((s.from + s.to) / 2.0, y), below.clone())
                    }),
            )
            .map_err(render_err)?;

        chart
            .draw_series([
                PathElement::new(vec![(output, 0.25), (output, 0.75)], BLACK.stroke_width(1)),
                PathElement::new(vec![(base, 0.25), (base, 0.55)], AXIS_GREY.stroke_width(1)),
            ])
            .map_err(render_err)?;

        let marker = self.config.anchored(self.config.font_size, HPos::Center, VPos::Bottom);
        chart
            .draw_series([
                Text::new(format!("f(x) = {:.2}", output), (output, 0.8), marker.clone()),
                Text::new(format!("base value = {:.2}", base), (base, 1.3), marker),
            ])
            .map_err(render_err)?;

        Ok(())
    }
}

/// Escape text for HTML element content and attribute values
pub(crate) fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Standalone page: inline SVG force bar plus a contribution table
pub(crate) fn force_page(explanation: &Explanation, config: &RenderConfig) -> Result<String> {
    let svg = canvas::render_svg_string(&ForcePlot { explanation, config })?;
    let font = html_escape(&config.font_family);

    let mut rows = String::new();
    for c in explanation.sorted_contributions() {
        let class = if c.contribution >= 0.0 { "pos" } else { "neg" };
        // Writing into a String cannot fail
        let _ = writeln!(
            rows,
            "      <tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td></tr>",
            html_escape(&c.feature_name),
            canvas::format_value(c.feature_value),
            class,
            canvas::format_signed(c.contribution)
        );
    }

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>SHAP force plot</title>
  <style>
    body {{ font-family: "{font}", serif; margin: 24px; color: #222; }}
    h1 {{ font-size: 20px; font-weight: normal; }}
    .summary {{ margin: 8px 0 16px 0; }}
    table {{ border-collapse: collapse; margin-top: 16px; }}
    th, td {{ padding: 4px 12px; border-bottom: 1px solid #ddd; text-align: left; }}
    .pos {{ color: #ff0051; }}
    .neg {{ color: #008bfb; }}
    .meta {{ color: #888; font-size: 12px; margin-top: 24px; }}
  </style>
</head>
<body>
  <h1>Force plot, test row {index}</h1>
  <div class="summary">base value = {base:.4} &nbsp; f(x) = {output:.4} &nbsp;
    <span class="pos">higher</span> / <span class="neg">lower</span></div>
  <div class="force">
{svg}
  </div>
  <table>
    <thead><tr><th>Feature</th><th>Value</th><th>SHAP value</th></tr></thead>
    <tbody>
{rows}    </tbody>
  </table>
  <p class="meta">Generated {timestamp}</p>
</body>
</html>
"#,
        font = font,
        index = explanation.instance_index,
        base = explanation.base_value,
        output = explanation.prediction(),
        svg = svg,
        rows = rows,
        timestamp = Local::now().format("%Y-%m-%d %H:%M:%S"),
    ))
}
