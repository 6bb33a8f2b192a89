//! Output formatting utilities for the CLI.

use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Print a value as JSON. Text output is handled by the caller.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet || format != OutputFormat::Json {
        return;
    }
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

/// Print a success message.
pub fn success(msg: &str, format: OutputFormat, quiet: bool) {
    if quiet || format != OutputFormat::Text {
        return;
    }
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an info message.
pub fn info(msg: &str, format: OutputFormat, quiet: bool) {
    if quiet || format != OutputFormat::Text {
        return;
    }
    println!("{}", msg);
}

/// Print a warning message.
pub fn warning(msg: &str, format: OutputFormat, quiet: bool) {
    if quiet || format != OutputFormat::Text {
        return;
    }
    eprintln!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print a failure message. Shown even when quiet.
pub fn failure(msg: &str, format: OutputFormat) {
    if format != OutputFormat::Text {
        return;
    }
    eprintln!("{} {}", "✗".red().bold(), msg);
}
