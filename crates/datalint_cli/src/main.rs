mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datalint_core::{Check, DatasetFormat};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "datalint")]
#[command(version, about = "Dataset format detection and validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (YAML or TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the format of a dataset file
    Sniff {
        /// Path to the dataset file
        path: String,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Validate a dataset file against its detected or declared format
    Validate {
        /// Path to the dataset file
        path: String,

        /// Validate against this format instead of the detected one
        #[arg(long = "as", value_name = "FORMAT")]
        declared: Option<DatasetFormat>,

        /// Enable strict validation mode (fail on warnings)
        #[arg(short, long)]
        strict: bool,

        /// Records to validate before the result becomes partial
        #[arg(long)]
        sample_rows: Option<usize>,

        /// Checks to run: structure, header, content
        #[arg(long, value_delimiter = ',')]
        checks: Vec<Check>,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Inspect every file under a dataset directory
    Scan {
        /// Dataset root directory
        dir: String,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    let config = datalint_config::load(cli.config.as_deref())
        .context("Failed to load engine configuration")?;

    // Execute command
    match cli.command {
        Commands::Sniff { path, output } => commands::sniff::execute(&path, &output, &config),

        Commands::Validate {
            path,
            declared,
            strict,
            sample_rows,
            checks,
            output,
        } => {
            let args = commands::validate::ValidateArgs {
                declared,
                strict,
                sample_rows,
                checks,
            };
            commands::validate::execute(&path, args, &output, &config).await
        }

        Commands::Scan { dir, output } => commands::scan::execute(&dir, &output, &config).await,
    }
}
