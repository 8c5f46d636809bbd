//! Tailor CLI - Command-line interface for the Tailor Platform SDK.

use clap::Parser;

use tailor_cli::cli::{Cli, Command};
use tailor_cli::error::CliResult;
use tailor_cli::{commands, logging, output};

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate(args) => commands::migrate::run(&cli.config, args).await,
        Command::Version => commands::version::run().await,
    }
}
