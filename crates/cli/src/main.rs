//! Meterwatch CLI
//!
//! Classify single readings and replay reading feeds offline, using the
//! same classifier and alert engine as the monitor.

mod commands;
mod error;
mod output;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{classify, replay};
use monitor_lib::DeviceId;
use settings::Settings;

/// Meterwatch CLI
#[derive(Parser)]
#[command(name = "mwctl")]
#[command(author, version, about = "Offline tools for Meterwatch reading validation", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify one reading against an optional previous reading and hourly stats
    Classify {
        /// Device the reading belongs to
        #[arg(long, default_value_t = 1)]
        device_id: DeviceId,

        /// Accumulated meter value
        #[arg(long, allow_hyphen_values = true)]
        value: f64,

        /// Reading timestamp (defaults to now)
        #[arg(long)]
        timestamp: Option<String>,

        /// Accumulated value of the previous reading
        #[arg(long, requires = "previous_timestamp", allow_hyphen_values = true)]
        previous_value: Option<f64>,

        /// Timestamp of the previous reading
        #[arg(long, requires = "previous_value")]
        previous_timestamp: Option<String>,

        /// Historical average delta for the reading's hour
        #[arg(long, allow_hyphen_values = true)]
        avg: Option<f64>,

        /// Historical delta standard deviation for the reading's hour
        #[arg(long, requires = "avg")]
        std: Option<f64>,
    },

    /// Replay a newline-delimited JSON reading feed through the alert engine
    Replay {
        /// Feed file, one `{"device_id", "device_code", "value", "timestamp"}` object per line
        file: PathBuf,

        /// JSON array of hourly delta statistics
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Only print alert transitions
        #[arg(long)]
        alerts_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Classify {
            device_id,
            value,
            timestamp,
            previous_value,
            previous_timestamp,
            avg,
            std,
        } => {
            let request = classify::ClassifyRequest {
                device_id,
                value,
                timestamp,
                previous_value,
                previous_timestamp,
                avg,
                std,
            };
            classify::run(request, &cli.settings, cli.format)?;
        }
        Commands::Replay {
            file,
            stats,
            alerts_only,
        } => {
            replay::run(file, stats, alerts_only, &cli.settings, cli.format).await?;
        }
    }

    Ok(())
}
