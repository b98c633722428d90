mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "runcode")]
#[command(about = "Run JavaScript in the runcode sandbox")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a JavaScript file and print the result JSON
    Run {
        /// Source file, or "-" to read from stdin
        #[arg(default_value = "-")]
        file: String,

        /// Execution timeout in milliseconds (clamped to the configured range)
        #[arg(short, long)]
        timeout_ms: Option<f64>,

        /// Latitude hint exposed through api.getEstimatedLocation()
        #[arg(long, allow_hyphen_values = true)]
        latitude: Option<String>,

        /// Longitude hint exposed through api.getEstimatedLocation()
        #[arg(long, allow_hyphen_values = true)]
        longitude: Option<String>,

        /// City hint
        #[arg(long)]
        city: Option<String>,

        /// Country hint
        #[arg(long)]
        country: Option<String>,

        /// Sandbox config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pretty-print the result JSON
        #[arg(short, long)]
        pretty: bool,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the runCode tool definition
    Schema {
        /// Sandbox config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    init_tracing(verbose);

    match cli.command {
        Commands::Run {
            file,
            timeout_ms,
            latitude,
            longitude,
            city,
            country,
            config,
            pretty,
            verbose: _,
        } => {
            let hints = commands::request_hints(latitude, longitude, city, country);
            let result = commands::run_code(&file, timeout_ms, hints, config.as_deref()).await?;
            commands::print_result(&result, pretty)?;
            if !result.success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Schema { config } => commands::print_schema(config.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
