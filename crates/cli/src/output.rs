//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use monitor_lib::{AlertSeverity, Classification};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table, or a note when there is nothing to show
pub fn print_table<T: Tabled>(items: &[T], empty_message: &str) {
    if items.is_empty() {
        println!("{}", empty_message.yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an optional number with two decimals
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

pub fn color_classification(classification: Classification) -> String {
    let label = classification.as_str();
    match classification {
        Classification::Valid => label.green().to_string(),
        Classification::Uncertain => label.yellow().to_string(),
        Classification::Quarantine => label.red().to_string(),
    }
}

pub fn color_severity(severity: AlertSeverity) -> String {
    match severity {
        AlertSeverity::Warning => "warning".yellow().to_string(),
        AlertSeverity::Critical => "critical".red().bold().to_string(),
    }
}
