//! garment-pattern: turn reconstructed garment surfaces into sewing patterns.

use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod output;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "garment-pattern")]
#[command(about = "Segment, flatten, dart, seam and grade garment surfaces into pattern pieces")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Suppress non-error output.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a garment and emit the pattern.
    Run(commands::run::RunArgs),

    /// Check a garment against its template without flattening.
    Validate(commands::validate::ValidateArgs),

    /// List the built-in (or a custom) template library.
    Templates(commands::templates::TemplatesArgs),

    /// Write the synthetic torso garment as an input document.
    Sample(commands::sample::SampleArgs),
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.format, cli.quiet),
        Commands::Validate(args) => commands::validate::execute(args, cli.format, cli.quiet),
        Commands::Templates(args) => commands::templates::execute(args, cli.format, cli.quiet),
        Commands::Sample(args) => commands::sample::execute(args, cli.format, cli.quiet),
    }
}
