//! Crop Disease Classification CLI
//!
//! Trains the classifier, keeps the best checkpoint and writes the
//! submission report. All tunables come from an optional TOML file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use crop_disease::backend::{backend_name, default_device, TrainingBackend};
use crop_disease::config::RunConfig;
use crop_disease::pipeline;
use crop_disease::utils::logging::init_logging;

/// Train a crop disease classifier and write the submission
#[derive(Parser, Debug)]
#[command(name = "crop_disease")]
#[command(version = "0.1.0")]
#[command(about = "Crop disease classification training and submission with Burn", long_about = None)]
struct Cli {
    /// TOML run configuration; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose).context("Failed to initialize logging")?;

    let config = match &cli.config {
        Some(path) => RunConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            let config = RunConfig::default();
            config.validate().context("Default configuration is invalid")?;
            config
        }
    };

    println!("{}", "Crop Disease Training".green().bold());
    println!("  Backend:    {}", backend_name());
    println!("  Model:      {} (fold {})", config.model_name, config.fold);
    println!("  Epochs:     {}", config.epochs);
    println!("  Batch size: {}", config.batch_size);
    if let Some(kind) = config.resume {
        println!("  Resume:     {}", kind.to_string().yellow());
    }
    println!();

    let report = pipeline::run::<TrainingBackend>(&config, default_device()).context("Run failed")?;

    println!();
    println!("{}", "Run complete!".green().bold());
    println!("  Epochs run:       {}", report.training.epochs_run);
    println!("  Best top-1:       {:.4}", report.best_precision1);
    println!("  Predictions:      {}", report.predictions);
    println!("  Submission:       {}", report.submission.display().to_string().cyan());

    Ok(())
}
