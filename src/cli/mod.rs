//! shap-report CLI Module
//!
//! Command-line interface for a single report run.

use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::ReportConfig;
use crate::pipeline::{ReportArtifacts, ReportPipeline};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<14}", key)), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_skip(msg: &str) {
    println!("  {} {}", dim("–"), muted(msg));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug, Default)]
#[command(name = "shap-report")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Random forest + TreeSHAP figures for a tabular clinical dataset")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input data file (CSV, TSV, JSON, or Parquet)
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Directory receiving every output file
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Test row explained by the force and waterfall plots
    #[arg(long)]
    pub sample_index: Option<usize>,

    /// Class whose attributions are reported
    #[arg(long)]
    pub class_index: Option<usize>,

    /// Skip the browser screenshot of the force plot
    #[arg(long)]
    pub no_screenshot: bool,

    /// Browser executable used for the screenshot
    #[arg(long)]
    pub browser: Option<PathBuf>,
}

impl Cli {
    /// Merge the configuration file and the flags
    pub fn resolve_config(&self) -> anyhow::Result<ReportConfig> {
        let mut config = match &self.config {
            Some(path) => ReportConfig::from_json_file(path)?,
            None => ReportConfig::default(),
        };

        if let Some(data) = &self.data {
            config = config.with_data_path(data.clone());
        }
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir.clone());
        }
        if let Some(index) = self.sample_index {
            config = config.with_sample_index(index);
        }
        if let Some(index) = self.class_index {
            config = config.with_class_index(index);
        }
        if self.no_screenshot {
            config.screenshot.enabled = false;
        }
        if let Some(browser) = &self.browser {
            config.screenshot.browser = Some(browser.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_report(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config()?;

    println!();
    line_box_top();
    line_box_center(&"shap-report".white().bold().to_string());
    line_box_sep();
    line_box(&kv("data", &config.data_path.display().to_string()));
    line_box(&kv("output", &config.output_dir.display().to_string()));
    line_box(&kv("trees", &config.n_estimators.to_string()));
    line_box(&kv("class index", &config.class_index.to_string()));
    line_box(&kv("sample index", &config.sample_index.to_string()));
    line_box_bottom();

    let start = Instant::now();
    let pipeline = ReportPipeline::new(config);
    let artifacts = pipeline.run()?;

    print_artifacts(&artifacts);

    println!();
    println!(
        "  {} {}",
        accent("›"),
        dim(&format!("finished in {:.2?}", start.elapsed()))
    );
    println!();

    Ok(())
}

fn print_artifacts(artifacts: &ReportArtifacts) {
    section("Model");
    println!("  {}", kv("classes", &artifacts.classes.join(", ")));
    println!(
        "  {}",
        kv("train / test", &format!("{} / {}", artifacts.n_train, artifacts.n_test))
    );
    println!(
        "  {}",
        kv("accuracy", &format!("{:.4}", artifacts.metrics.accuracy))
    );
    if let Some(auc) = artifacts.metrics.roc_auc {
        println!("  {}", kv("ROC AUC", &format!("{:.4}", auc)));
    }
    println!(
        "  {}",
        kv("train time", &format!("{:.3}s", artifacts.training_time_secs))
    );

    section("Explanation");
    println!("  {}", kv("base value", &format!("{:.4}", artifacts.base_value)));
    println!("  {}", kv("f(x)", &format!("{:.4}", artifacts.sample_output)));
    if let Some(err) = artifacts.additivity_error {
        println!("  {}", kv("additivity", &format!("{:.2e}", err)));
    }

    section("Files");
    for path in [
        &artifacts.processed_csv,
        &artifacts.summary_plot,
        &artifacts.summary_bar_plot,
        &artifacts.force_html,
        &artifacts.waterfall_plot,
    ] {
        step_ok(&path.display().to_string());
    }
    match &artifacts.force_image {
        Some(path) => step_ok(&path.display().to_string()),
        None => step_skip("force plot screenshot not captured"),
    }
}
