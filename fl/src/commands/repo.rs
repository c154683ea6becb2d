//! `fl repo`: queue package and origin changes for the next start.

use anyhow::Result;
use clap::Args;
use tracing::{debug, info};

use crate::actions::{ActionEntry, ActionKind, ActionLog};
use crate::config::{DataPaths, FlConfig};
use crate::context::{confirm, read_plugin_list};
use crate::output::Output;
use crate::repo::{LoadedRepositories, OriginsFile, RepositoryIndex, fetch_origin, request_package};

#[derive(Debug, Args)]
pub struct RepoArgs {
    /// Add packages by name
    #[arg(short, long, num_args = 1.., value_name = "NAME")]
    pub add: Vec<String>,

    /// Add and activate packages by name
    #[arg(long, visible_alias = "aa", num_args = 1.., value_name = "NAME")]
    pub add_activate: Vec<String>,

    /// Remove packages by name
    #[arg(short, long, num_args = 1.., value_name = "NAME")]
    pub remove: Vec<String>,

    /// Activate packages by name
    #[arg(long, num_args = 1.., value_name = "NAME")]
    pub activate: Vec<String>,

    /// Deactivate packages by name
    #[arg(short, long, num_args = 1.., value_name = "NAME")]
    pub deactivate: Vec<String>,

    /// Add repository origins
    #[arg(long, visible_alias = "ao", num_args = 1.., value_name = "ORIGIN")]
    pub add_origin: Vec<String>,

    /// Remove repository origins
    #[arg(long, visible_alias = "ro", num_args = 1.., value_name = "ORIGIN")]
    pub remove_origin: Vec<String>,

    /// Overwrite the origins file with the default origins
    #[arg(long)]
    pub default_origin: bool,

    /// Add and activate every package of every repository
    #[arg(long)]
    pub all: bool,

    /// Print every package the known repositories provide
    #[arg(long)]
    pub list_packages: bool,

    /// Answer yes to every confirmation dialog
    #[arg(long)]
    pub yes: bool,

    /// Log verbosity (0 = warnings only, 3 = trace)
    #[arg(short, long, default_value_t = 1)]
    pub verbosity: u8,
}

fn write_default_origins(config: &FlConfig, origins: &OriginsFile) -> Result<()> {
    let spinner = Output::spinner(format!(
        "Downloading default origins from {}",
        config.default_origin_url
    ));
    match fetch_origin(&config.default_origin_url) {
        Ok(content) => {
            origins.replace(&content)?;
            spinner.finish_success(format!("Wrote {}", origins.path().display()));
            Ok(())
        }
        Err(e) => {
            spinner.finish_error("Failed to download default origins");
            Err(e)
        }
    }
}

fn append(log: &ActionLog, kind: ActionKind, argument: &str) -> Result<usize> {
    log.append(&ActionEntry::new(kind, argument))?;
    Ok(1)
}

pub fn run(args: RepoArgs) -> Result<()> {
    let paths = DataPaths::from_env()?;
    paths.ensure_exists()?;
    let config = FlConfig::load(&paths)?;
    let origins = OriginsFile::new(paths.origins_file());
    let log = ActionLog::new(paths.action_log());

    if args.default_origin {
        write_default_origins(&config, &origins)?;
    } else if !origins.exists() {
        info!("[repo] First startup: no origins file at {}", origins.path().display());
        if confirm(args.yes, "Do you want to create the default origins file?")? {
            write_default_origins(&config, &origins)?;
        }
    }

    let repos = LoadedRepositories::load(&origins.origins()?);
    debug!(repositories = repos.repositories().len(), "Repositories loaded");

    let mut add_activate = args.add_activate.clone();
    if args.all {
        add_activate.extend(repos.all_packages().into_iter().map(|p| p.name.clone()));
    }

    let mut queued = 0usize;
    for origin in &args.remove_origin {
        queued += append(&log, ActionKind::RemoveOrigin, origin)?;
    }
    for origin in &args.add_origin {
        queued += append(&log, ActionKind::AddOrigin, origin)?;
    }
    for name in &args.deactivate {
        queued += append(&log, ActionKind::DeactivatePackage, name)?;
    }
    for name in &args.remove {
        queued += append(&log, ActionKind::RemovePackage, name)?;
    }
    for name in &args.add {
        queued += usize::from(request_package(&repos, &log, ActionKind::AddPackage, name)?);
    }
    for name in &add_activate {
        queued += usize::from(request_package(
            &repos,
            &log,
            ActionKind::AddActivatePackage,
            name,
        )?);
    }
    for name in &args.activate {
        queued += append(&log, ActionKind::ActivatePackage, name)?;
    }

    if args.list_packages {
        let installed = read_plugin_list(&paths.plugin_list())?;
        Output::subheader("PACKAGES:");
        for package in repos.all_packages() {
            let marker = if installed.contains(&package.name) {
                " (installed)"
            } else {
                ""
            };
            Output::list_item(format!(
                "{} {} {}{marker}",
                package.name, package.version, package.origin
            ));
        }
    }

    if queued > 0 {
        Output::success(format!(
            "Queued {queued} action(s) in {}; they apply on the next start",
            log.path().display()
        ));
    }
    Ok(())
}
