//! `fl plugins`: queue plugin installs and removals.

use anyhow::Result;
use clap::Args;

use crate::actions::{ActionEntry, ActionKind, ActionLog};
use crate::config::DataPaths;
use crate::output::Output;

#[derive(Debug, Args)]
pub struct PluginsArgs {
    /// Install and activate plugin packages
    #[arg(short, long, num_args = 1.., value_name = "PACKAGE")]
    pub add: Vec<String>,

    /// Remove plugin packages
    #[arg(short, long, num_args = 1.., value_name = "PACKAGE")]
    pub remove: Vec<String>,

    /// Log verbosity (0 = warnings only, 3 = trace)
    #[arg(short, long, default_value_t = 1)]
    pub verbosity: u8,
}

pub fn run(args: PluginsArgs) -> Result<()> {
    let paths = DataPaths::from_env()?;
    let log = ActionLog::new(paths.action_log());

    let entries = args
        .remove
        .iter()
        .map(|name| ActionEntry::new(ActionKind::RemovePackage, name))
        .chain(
            args.add
                .iter()
                .map(|name| ActionEntry::new(ActionKind::AddActivatePackage, name)),
        );

    let mut queued = 0;
    for entry in entries {
        log.append(&entry)?;
        Output::step(entry.to_string());
        queued += 1;
    }

    if queued == 0 {
        Output::info("Nothing to do. Use --add or --remove.");
    } else {
        Output::success(format!("Queued {queued} action(s); they apply on the next start"));
    }
    Ok(())
}
