//! shap-report - Main Entry Point
//!
//! Trains the forest, explains it and writes the report figures.

use clap::Parser;
use shap_report::cli::{cmd_report, Cli};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shap_report=info".into()),
        )
        .init();

    let cli = Cli::parse();
    cmd_report(&cli)
}
