use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so that command output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("livetree=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format.into();

    match &cli.command {
        Commands::Replay(args) => commands::replay::run(args, format),
        Commands::Diff(args) => commands::diff::run(args, format),
        Commands::Position(command) => commands::position::run(command, format),
    }
}
