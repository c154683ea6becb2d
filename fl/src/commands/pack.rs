//! `fl pack`: archive a directory into a `.flres` package.
//!
//! With `--export-fl` the directory is first copied to a staging area where
//! every source is compiled to a sibling `.flc` (and removed unless
//! `--keep-fl`). The input directory itself is never modified.

use anyhow::{Context, Result, bail};
use clap::Args;
use fl_common::archive::create_package;
use fl_common::package::PackageManifest;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::context::FlContext;
use crate::driver::{BatchArgs, BatchCommand, Driver, report_progress};
use crate::resolve::{COMPILED_EXTENSION, Job, SOURCE_EXTENSION, SupportedExtensions};

pub const DEFAULT_PACKAGE_NAME: &str = "NO_NAME";
pub const DEFAULT_UNPACK_CONFIG: &str = "default";

#[derive(Debug, Args)]
pub struct PackArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Define tags used when exporting sources
    #[arg(short, long, num_args = 1.., value_name = "TAG")]
    pub defines: Vec<String>,

    /// Extra serialization steps used when exporting sources
    #[arg(short, long, num_args = 1.., value_name = "STEP")]
    pub extra_steps: Vec<String>,

    /// Compile .fl sources to .flc before packing
    #[arg(long, visible_alias = "export")]
    pub export_fl: bool,

    /// Keep the .fl sources next to the exported .flc files
    #[arg(long)]
    pub keep_fl: bool,

    /// Package name
    #[arg(short, long, default_value = DEFAULT_PACKAGE_NAME)]
    pub name: String,

    /// Unpack configuration recorded in the package
    #[arg(short, long, default_value = DEFAULT_UNPACK_CONFIG)]
    pub unpack_config: String,
}

pub struct PackCommand {
    pub defines: Vec<String>,
    pub extra_steps: Vec<String>,
    pub export_fl: bool,
    pub keep_fl: bool,
    pub name: String,
    pub unpack_config: String,
}

impl From<&PackArgs> for PackCommand {
    fn from(args: &PackArgs) -> Self {
        Self {
            defines: args.defines.clone(),
            extra_steps: args.extra_steps.clone(),
            export_fl: args.export_fl,
            keep_fl: args.keep_fl,
            name: args.name.clone(),
            unpack_config: args.unpack_config.clone(),
        }
    }
}

impl PackCommand {
    /// Compile every source below `root` in place.
    fn export_sources(&self, ctx: &FlContext, root: &Path, progress: &mut Steps) -> Result<()> {
        let sources = files_with_extension(root, SOURCE_EXTENSION)?;
        progress.total += sources.len();
        progress.next("Exporting FL Scripts..");

        for source in sources {
            progress.next(format!("Exporting File: {}", source.display()));
            let program = ctx.parse_program(&source, &self.defines)?;
            ctx.save_program(
                &program,
                &self.extra_steps,
                &source.with_extension(COMPILED_EXTENSION),
            )?;
            if !self.keep_fl {
                fs::remove_file(&source)
                    .with_context(|| format!("Failed to remove {}", source.display()))?;
            }
        }
        Ok(())
    }
}

impl BatchCommand for PackCommand {
    fn name(&self) -> &'static str {
        "pack"
    }

    fn extensions(&self) -> SupportedExtensions {
        SupportedExtensions::new(&[""], &["flres"])
    }

    fn run_job(&mut self, ctx: &FlContext, job: &Job) -> Result<()> {
        if !job.input.is_dir() {
            bail!("Not a directory: {}", job.input.display());
        }
        let mut progress = Steps {
            current: 0,
            total: 2,
        };

        let staging = if self.export_fl {
            let staging = tempfile::Builder::new()
                .prefix("fl-pack-")
                .tempdir()
                .context("Failed to create staging directory")?;
            copy_tree(&job.input, staging.path())?;
            self.export_sources(ctx, staging.path(), &mut progress)?;
            Some(staging)
        } else {
            None
        };
        let root = staging.as_ref().map_or(job.input.as_path(), |s| s.path());

        progress.next("Creating Package.");
        let manifest = PackageManifest::scan(root, &self.name, &self.unpack_config)
            .with_context(|| format!("Failed to scan {}", root.display()))?;
        create_package(root, &manifest, &job.output)
            .with_context(|| format!("Failed to write {}", job.output.display()))?;
        info!(
            "[pack] {} ({} file(s), unpack config '{}') => {}",
            manifest.name,
            manifest.files.len(),
            manifest.unpack_config,
            job.output.display()
        );

        progress.next("Cleaning Up.");
        if let Some(staging) = staging {
            staging.close().context("Failed to remove staging directory")?;
        }
        Ok(())
    }
}

struct Steps {
    current: usize,
    total: usize,
}

impl Steps {
    fn next(&mut self, message: impl std::fmt::Display) {
        self.current += 1;
        report_progress("pack", self.current, self.total, message);
    }
}

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(target).with_context(|| format!("Failed to create {}", target.display()))?;
    for entry in
        fs::read_dir(source).with_context(|| format!("Failed to read {}", source.display()))?
    {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).with_context(|| {
                format!("Failed to copy {} to {}", from.display(), to.display())
            })?;
        }
    }
    Ok(())
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            found.extend(files_with_extension(&path, extension)?);
        } else if path.extension().is_some_and(|e| e == extension) {
            found.push(path);
        }
    }
    debug!(dir = %dir.display(), count = found.len(), extension, "Collected files");
    Ok(found)
}

pub fn run(args: PackArgs) -> Result<()> {
    let mut command = PackCommand::from(&args);
    Driver::new().run(&args.batch, &mut command)?;
    Ok(())
}
