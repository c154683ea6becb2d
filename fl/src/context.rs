//! Process context shared by every batch command.
//!
//! Built once before the first job. Owns the compute device, the
//! instruction set discovered at startup, the program parser (with the
//! selected check profile attached) and the codec/encoder used to write
//! results. Commands borrow it; nothing here is global.

use anyhow::{Context, Result, bail};
use is_terminal::IsTerminal;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::codec::{FlcCodec, ProgramCodec};
use crate::backend::encode::ImageFileWriter;
use crate::backend::host::{HostDevice, HostParser};
use crate::backend::kernels::{self, InstructionSet, KernelReport};
use crate::backend::program::{CheckProfile, Program};
use crate::backend::{ComputeDevice, DeviceBuffer, ImageSink, ProgramParser};
use crate::config::{DataPaths, FlConfig};
use crate::resolve::{COMPILED_EXTENSION, SOURCE_EXTENSION, extension_of};

/// Startup options taken from the shared command-line flags.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub checks: CheckProfile,
    pub assume_yes: bool,
}

pub struct FlContext {
    pub paths: DataPaths,
    pub config: FlConfig,
    pub assume_yes: bool,
    pub device: Arc<dyn ComputeDevice>,
    pub instructions: Arc<InstructionSet>,
    pub kernel_report: KernelReport,
    /// Names from the installed plugin list.
    pub plugins: Vec<String>,
    pub sink: Arc<dyn ImageSink>,
    parser: Box<dyn ProgramParser>,
    codec: Box<dyn ProgramCodec>,
}

impl FlContext {
    /// Bring up the host device using configuration from the data directory.
    pub fn initialize(options: &InitOptions) -> Result<Self> {
        let paths = DataPaths::from_env()?;
        let config = FlConfig::load(&paths)?;
        let kernel_dir = config.resolve_kernel_dir();
        Self::with_device(paths, config, Arc::new(HostDevice::new()), &kernel_dir, options)
    }

    /// Build a context around an already created device.
    ///
    /// Fails when `kernel_dir` yields no kernels or when the check profile
    /// cannot work with the discovered instruction set.
    pub fn with_device(
        paths: DataPaths,
        config: FlConfig,
        device: Arc<dyn ComputeDevice>,
        kernel_dir: &Path,
        options: &InitOptions,
    ) -> Result<Self> {
        info!("[fl] Initializing on device '{}'", device.name());

        let plugins = read_plugin_list(&paths.plugin_list())?;
        debug!(count = plugins.len(), "Installed plugins");

        let (instructions, kernel_report) = kernels::discover(device.as_ref(), kernel_dir)?;
        let instructions = Arc::new(instructions);

        let parser = HostParser::new(Arc::clone(&instructions), options.checks)?;

        info!(
            "[fl] Initialized: {} kernel(s) from {} file(s), {} failed, {} plugin(s), checks: {}",
            instructions.len(),
            kernel_report.files,
            kernel_report.failures.len(),
            plugins.len(),
            options.checks
        );
        for failure in &kernel_report.failures {
            warn!(
                "[fl]   kernel file failed: {}: {}",
                failure.path.display(),
                failure.message
            );
        }

        Ok(Self {
            paths,
            config,
            assume_yes: options.assume_yes,
            device,
            instructions,
            kernel_report,
            plugins,
            sink: Arc::new(ImageFileWriter),
            parser: Box::new(parser),
            codec: Box::new(FlcCodec),
        })
    }

    pub fn parse_program(&self, path: &Path, defines: &[String]) -> Result<Program> {
        debug!(path = %path.display(), ?defines, "Parsing");
        self.parser.parse(path, defines)
    }

    /// Load a compiled program or parse a source file, by extension.
    pub fn load_program(&self, path: &Path, defines: &[String]) -> Result<Program> {
        match extension_of(path).as_str() {
            COMPILED_EXTENSION => self.codec.load(path),
            SOURCE_EXTENSION => self.parse_program(path, defines),
            other => bail!("Not a program: {} (.{other})", path.display()),
        }
    }

    pub fn save_program(&self, program: &Program, extra_steps: &[String], dest: &Path) -> Result<()> {
        self.codec.save(program, extra_steps, dest)
    }

    /// Run `program` on a fresh `width`×`height` input buffer and return the
    /// output buffer. The input buffer is released either way.
    pub fn render(&self, program: &Program, width: u32, height: u32, warm: bool) -> Result<DeviceBuffer> {
        let input = self.device.allocate("Input", width, height)?;
        let output = self
            .device
            .execute(program, &self.instructions, &input, warm);
        input.release();
        output.with_context(|| format!("Failed to run program '{}'", program.name))
    }

    /// Read a buffer back and write it as an image, releasing the buffer.
    pub fn write_image(&self, buffer: &DeviceBuffer, dest: &Path) -> Result<()> {
        let written = self
            .device
            .read_back(buffer)
            .and_then(|image| self.sink.write(&image, dest));
        buffer.release();
        written
    }
}

/// Plugin names from `plugins.txt`, one per line. A missing file means no
/// plugins are installed.
pub fn read_plugin_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read plugin list {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Ask a yes/no question.
///
/// `--yes` answers yes without asking. Without a terminal on stdin the
/// answer is no.
pub fn confirm(assume_yes: bool, prompt: &str) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        warn!("Non-interactive mode detected; use --yes to skip prompts. Assuming no: {prompt}");
        return Ok(false);
    }
    cliclack::confirm(prompt)
        .initial_value(true)
        .interact()
        .context("Failed to read confirmation")
}

/// Path of `relative` inside `root` with its extension replaced.
pub fn sibling_with_extension(root: &Path, relative: &Path, extension: &str) -> PathBuf {
    root.join(relative).with_extension(extension)
}
