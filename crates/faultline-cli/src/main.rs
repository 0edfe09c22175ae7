//! Faultline CLI - single entrypoint for the ingestion server and tooling.

mod commands;

use clap::{Parser, Subcommand};
use commands::{SampleCommand, ServeCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "FAULTLINE_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "FAULTLINE_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the ingestion HTTP server and background workers
    Serve(ServeCommand),
    /// Build and print a sampled corpus for a set of issues
    Sample(SampleCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.clone();

    // If RUST_LOG is set, use it directly; otherwise use our default filter
    // with all faultline crates at the chosen level and noisy dependencies
    // kept at warn
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .expect("Invalid RUST_LOG environment variable")
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "faultline_cli={level},\
             faultline_core={level},\
             faultline_entities={level},\
             faultline_migrations={level},\
             faultline_database={level},\
             faultline_queue={level},\
             faultline_ingest={level},\
             faultline_sampler={level},\
             sqlx=warn,\
             sea_orm=warn,\
             h2=warn,\
             tower=warn,\
             hyper=warn,\
             rustls=warn",
            level = log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default subscriber");

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(),
        Commands::Sample(sample_cmd) => sample_cmd.execute(),
    }
}
