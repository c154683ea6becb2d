//! Shell completion generation.

use anyhow::Result;
use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::Generator;
use clap_complete_nushell::Nushell;
use std::io;

use crate::cli::Cli;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    Nushell,
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

fn generate(generator: impl Generator, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(generator, &mut cmd, name, out);
}

pub fn run(args: CompletionsArgs) -> Result<()> {
    let mut stdout = io::stdout();
    match args.shell {
        Shell::Bash => generate(clap_complete::Shell::Bash, &mut stdout),
        Shell::Zsh => generate(clap_complete::Shell::Zsh, &mut stdout),
        Shell::Fish => generate(clap_complete::Shell::Fish, &mut stdout),
        Shell::Nushell => generate(Nushell, &mut stdout),
    }
    Ok(())
}
