//! `fl unpack`: extract `.flres` packages.
//!
//! The package's unpack config picks which unpackers apply. Each file goes
//! to the first registered unpacker for that config which handles it; files
//! nobody handles are copied as they are.

use anyhow::{Context, Result};
use clap::Args;
use fl_common::archive::extract_package;
use fl_common::package::FILES_DIR;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::context::{FlContext, sibling_with_extension};
use crate::driver::{BatchArgs, BatchCommand, Driver, report_progress};
use crate::resolve::{COMPILED_EXTENSION, Job, SOURCE_EXTENSION, SupportedExtensions, extension_of};

/// Converts one packaged file while unpacking.
pub trait Unpacker {
    /// Unpack config this unpacker belongs to.
    fn config(&self) -> &'static str;

    fn handles(&self, relative: &Path) -> bool;

    /// Unpack `source` (stored at `relative` in the package) into `target`.
    fn unpack(&self, ctx: &FlContext, source: &Path, target: &Path, relative: &Path) -> Result<()>;
}

/// `fl2flc`: compile sources.
struct SourceToCompiled;

impl Unpacker for SourceToCompiled {
    fn config(&self) -> &'static str {
        "fl2flc"
    }

    fn handles(&self, relative: &Path) -> bool {
        extension_of(relative) == SOURCE_EXTENSION
    }

    fn unpack(&self, ctx: &FlContext, source: &Path, target: &Path, relative: &Path) -> Result<()> {
        let program = ctx.parse_program(source, &[])?;
        ctx.save_program(
            &program,
            &[],
            &sibling_with_extension(target, relative, COMPILED_EXTENSION),
        )
    }
}

/// `fl2tex` and `flc2tex`: render programs to textures.
struct ProgramToTexture {
    config: &'static str,
    extension: &'static str,
}

impl Unpacker for ProgramToTexture {
    fn config(&self) -> &'static str {
        self.config
    }

    fn handles(&self, relative: &Path) -> bool {
        extension_of(relative) == self.extension
    }

    fn unpack(&self, ctx: &FlContext, source: &Path, target: &Path, relative: &Path) -> Result<()> {
        let program = ctx.load_program(source, &[])?;
        let resolution = ctx.config.resolution;
        let output = ctx.render(&program, resolution.width, resolution.height, false)?;
        ctx.write_image(&output, &sibling_with_extension(target, relative, "png"))
    }
}

/// `default`: copy everything unchanged.
struct RawCopy;

impl Unpacker for RawCopy {
    fn config(&self) -> &'static str {
        "default"
    }

    fn handles(&self, _relative: &Path) -> bool {
        true
    }

    fn unpack(&self, _ctx: &FlContext, source: &Path, target: &Path, relative: &Path) -> Result<()> {
        copy_file(source, &target.join(relative))
    }
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(source, dest)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
    Ok(())
}

#[derive(Default)]
pub struct UnpackCommand {
    unpackers: Vec<Box<dyn Unpacker>>,
}

impl UnpackCommand {
    pub fn register(&mut self, unpacker: Box<dyn Unpacker>) {
        debug!(config = unpacker.config(), "Registered unpacker");
        self.unpackers.push(unpacker);
    }

    fn unpacker_for(&self, config: &str, relative: &Path) -> Option<&dyn Unpacker> {
        self.unpackers
            .iter()
            .find(|u| u.config() == config && u.handles(relative))
            .map(|u| u.as_ref())
    }
}

impl BatchCommand for UnpackCommand {
    fn name(&self) -> &'static str {
        "unpack"
    }

    fn extensions(&self) -> SupportedExtensions {
        SupportedExtensions::new(&["flres"], &[""])
    }

    fn before_run(&mut self, _ctx: &FlContext) -> Result<()> {
        self.register(Box::new(SourceToCompiled));
        self.register(Box::new(ProgramToTexture {
            config: "fl2tex",
            extension: SOURCE_EXTENSION,
        }));
        self.register(Box::new(ProgramToTexture {
            config: "flc2tex",
            extension: COMPILED_EXTENSION,
        }));
        self.register(Box::new(RawCopy));
        Ok(())
    }

    fn run_job(&mut self, ctx: &FlContext, job: &Job) -> Result<()> {
        let staging = tempfile::Builder::new()
            .prefix("fl-unpack-")
            .tempdir()
            .context("Failed to create staging directory")?;
        let manifest = extract_package(&job.input, staging.path())
            .with_context(|| format!("Failed to extract {}", job.input.display()))?;
        info!(
            "[unpack] Package '{}' ({} file(s), unpack config '{}')",
            manifest.name,
            manifest.files.len(),
            manifest.unpack_config
        );

        fs::create_dir_all(&job.output)
            .with_context(|| format!("Failed to create {}", job.output.display()))?;
        let files_root = staging.path().join(FILES_DIR);
        let total = manifest.files.len();
        for (index, file) in manifest.files.iter().enumerate() {
            let relative = Path::new(&file.path);
            let source = files_root.join(relative);
            match self.unpacker_for(&manifest.unpack_config, relative) {
                Some(unpacker) => {
                    report_progress(
                        "unpack",
                        index + 1,
                        total,
                        format_args!("{} ({})", file.path, unpacker.config()),
                    );
                    unpacker.unpack(ctx, &source, &job.output, relative)?;
                }
                None => {
                    report_progress("unpack", index + 1, total, &file.path);
                    copy_file(&source, &job.output.join(relative))?;
                }
            }
        }

        staging.close().context("Failed to remove staging directory")?;
        Ok(())
    }
}

pub fn run(args: UnpackArgs) -> Result<()> {
    let mut command = UnpackCommand::default();
    Driver::new().run(&args.batch, &mut command)?;
    Ok(())
}

#[derive(Debug, Args)]
pub struct UnpackArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}
