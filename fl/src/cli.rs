//! CLI argument definitions for fl.
//!
//! Kept apart from `main.rs` so shell completion generation can reference
//! these types.

use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Debug, Parser)]
#[command(name = "fl")]
#[command(about = "FL command line - parse, run, pack and unpack FL programs")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile .fl sources to .flc
    #[command(visible_alias = "serialize")]
    Parse(commands::parse::ParseArgs),

    /// Run programs and write the output images
    ///
    /// Directories given as input are searched recursively for .flc and .fl
    /// files.
    Run(commands::run::RunArgs),

    /// Pack a directory into a .flres package
    #[command(visible_alias = "packer")]
    Pack(commands::pack::PackArgs),

    /// Unpack .flres packages into directories
    #[command(visible_alias = "unpacker")]
    Unpack(commands::unpack::UnpackArgs),

    /// Queue package and repository origin changes
    ///
    /// Changes are recorded in the startup action log and applied the next
    /// time the plugin host starts.
    Repo(commands::repo::RepoArgs),

    /// Queue plugin installs and removals
    Plugins(commands::plugins::PluginsArgs),

    /// Generate shell completions
    Completions(commands::completions::CompletionsArgs),
}

impl Commands {
    /// `--verbosity` of the selected command.
    pub fn verbosity(&self) -> u8 {
        match self {
            Commands::Parse(args) => args.batch.verbosity,
            Commands::Run(args) => args.batch.verbosity,
            Commands::Pack(args) => args.batch.verbosity,
            Commands::Unpack(args) => args.batch.verbosity,
            Commands::Repo(args) => args.verbosity,
            Commands::Plugins(args) => args.verbosity,
            Commands::Completions(_) => 0,
        }
    }
}

/// Log level for a `--verbosity` value.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CheckProfile;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "fl", "run", "-i", "a.fl", "b.flc", "-x", "64", "--y", "32", "--use-save-thread",
            "-v", "2",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.batch.input.len(), 2);
        assert_eq!(args.width, Some(64));
        assert_eq!(args.height, Some(32));
        assert_eq!(args.use_save_thread, 1);
        assert_eq!(args.batch.verbosity, 2);
    }

    #[test]
    fn resolution_flags_are_bounded() {
        assert!(Cli::try_parse_from(["fl", "run", "-i", "a.fl", "-x", "65536"]).is_err());
        assert!(Cli::try_parse_from(["fl", "run", "-i", "a.fl", "-y", "0"]).is_err());
        assert!(Cli::try_parse_from(["fl", "run", "-i", "a.fl", "-x", "16384"]).is_ok());
    }

    #[test]
    fn save_thread_defaults_to_inline() {
        let cli = Cli::try_parse_from(["fl", "run", "-i", "a.fl"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.use_save_thread, 0);
        assert_eq!(args.batch.checks, CheckProfile::InputValidation);
    }

    #[test]
    fn unknown_check_profile_is_rejected() {
        assert!(Cli::try_parse_from(["fl", "parse", "-i", "a.fl", "--checks", "fast"]).is_err());
    }

    #[test]
    fn aliases_resolve() {
        for argv in [
            vec!["fl", "serialize", "-i", "a.fl"],
            vec!["fl", "packer", "-i", "dir", "--export"],
            vec!["fl", "unpacker", "-i", "a.flres"],
            vec!["fl", "repo", "--aa", "blur", "--ao", "https://o", "--ro", "https://p"],
        ] {
            assert!(Cli::try_parse_from(&argv).is_ok(), "{argv:?}");
        }
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for_verbosity(0), "warn");
        assert_eq!(level_for_verbosity(1), "info");
        assert_eq!(level_for_verbosity(2), "debug");
        assert_eq!(level_for_verbosity(9), "trace");
    }
}
