mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use shelfmatch::Recommender;
use shelfmatch::config::{ENV_LOG_LEVEL, log_directive};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = cli
        .config
        .to_config()
        .context("failed to read book recommender configuration")?;
    let recommender = Recommender::new(config);

    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(&recommender, args),
        Commands::Recommend(args) => commands::recommend::run(&recommender, args),
        Commands::Remove(args) => commands::remove::run(&recommender, args),
        Commands::Feedback(args) => commands::feedback::run(&recommender, args),
        Commands::Refresh(args) => commands::refresh::run(&recommender, args),
        Commands::Books(args) => commands::books::run(&recommender, args),
        Commands::Status(args) => commands::status::run(&recommender, args),
    }
}

/// `RUST_LOG` wins; otherwise `BOOK_RECOMMENDER_LOG_LEVEL`, default `warn`.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_default();
        EnvFilter::try_new(log_directive(&level)).unwrap_or_else(|_| EnvFilter::new("warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
