use anyhow::Result;
use clap::Parser;
use is_terminal::IsTerminal;
use tracing_subscriber::EnvFilter;

use fl::cli::level_for_verbosity;
use fl::commands;
use fl::{Cli, Commands};

fn init_tracing(verbosity: u8) {
    // RUST_LOG wins, e.g. RUST_LOG=fl=trace
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fl={}", level_for_verbosity(verbosity))));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.command.verbosity());

    tracing::debug!(command = ?cli.command, "Starting");

    match cli.command {
        Commands::Parse(args) => commands::parse::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Pack(args) => commands::pack::run(args),
        Commands::Unpack(args) => commands::unpack::run(args),
        Commands::Repo(args) => commands::repo::run(args),
        Commands::Plugins(args) => commands::plugins::run(args),
        Commands::Completions(args) => commands::completions::run(args),
    }
}
