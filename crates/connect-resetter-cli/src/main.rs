use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "kafka-connect-resetter")]
#[command(about = "Reset the offsets of Kafka Connect connectors", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete the committed offsets of a sink connector's consumer group
    Sink(commands::sink::SinkArgs),

    /// Tombstone a source connector's entries in the offsets topic
    Source(commands::source::SourceArgs),
}

fn init_tracing(verbose: u8, format: LogFormat) {
    // Priority: RUST_LOG env var > verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Logs go to stderr so stdout only carries the outcome
    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Sink(args) => commands::sink::run(args).await,
        Commands::Source(args) => commands::source::run(args).await,
    }
}

/// Exit status for a failed run: the core error's code when there is one.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<kafka_connect_resetter_core::Error>()
        .and_then(|e| u8::try_from(e.exit_code()).ok())
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}
