//! Turning command-line inputs into a validated job list.
//!
//! Resolution happens entirely before the first job is dispatched:
//! directories are expanded, every input extension is checked, missing
//! outputs are synthesized next to their input and every output extension
//! is checked. A single mismatch rejects the whole batch.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::FlError;

/// Extension of a compiled program.
pub const COMPILED_EXTENSION: &str = "flc";
/// Extension of a program source file.
pub const SOURCE_EXTENSION: &str = "fl";

/// Extensions a command accepts, without the leading dot. `""` stands for
/// a path without extension, i.e. a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedExtensions {
    pub input: &'static [&'static str],
    pub output: &'static [&'static str],
}

impl SupportedExtensions {
    pub const fn new(input: &'static [&'static str], output: &'static [&'static str]) -> Self {
        Self { input, output }
    }

    /// Extension used for synthesized outputs.
    pub fn default_output(&self) -> &'static str {
        self.output.first().copied().unwrap_or("")
    }

    pub fn check_input(&self, path: &Path) -> Result<(), FlError> {
        check(self.input, path)
    }

    pub fn check_output(&self, path: &Path) -> Result<(), FlError> {
        check(self.output, path)
    }
}

fn check(allowed: &[&str], path: &Path) -> Result<(), FlError> {
    let extension = extension_of(path);
    if allowed.contains(&extension.as_str()) {
        return Ok(());
    }
    Err(FlError::UnsupportedExtension {
        extension: display_extension(&extension),
        path: path.to_path_buf(),
        expected: allowed
            .iter()
            .map(|e| display_extension(e))
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn display_extension(extension: &str) -> String {
    if extension.is_empty() {
        "<directory>".to_string()
    } else {
        format!(".{extension}")
    }
}

/// Extension of `path` without the dot, or `""`.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One unit of work: a single input and the output it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Output path for `input` when none was given: same directory, same stem,
/// `extension` appended (nothing appended when it is empty).
pub fn synthesize_output(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    let mut name = stem;
    if !extension.is_empty() {
        name.push(".");
        name.push(extension);
    }
    match input.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Expand extension-less inputs into the programs found below them.
///
/// Compiled programs come first, then sources; each group in directory
/// enumeration order. Inputs with an extension pass through unchanged.
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut expanded = Vec::new();
    for input in inputs {
        if input.extension().is_some() {
            expanded.push(input.clone());
            continue;
        }
        if !input.is_dir() {
            return Err(FlError::InputDirectoryNotFound {
                path: input.clone(),
            }
            .into());
        }
        collect_with_extension(input, COMPILED_EXTENSION, &mut expanded)?;
        collect_with_extension(input, SOURCE_EXTENSION, &mut expanded)?;
    }
    Ok(expanded)
}

fn collect_with_extension(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_with_extension(&path, extension, out)?;
        } else if path.extension().is_some_and(|e| e == extension) {
            out.push(path);
        }
    }
    Ok(())
}

/// Build and validate the job list.
///
/// `outputs[i]` pairs with the i-th input after expansion; inputs beyond the
/// given outputs get a synthesized output. Both paths are made absolute.
pub fn resolve_jobs(
    inputs: &[PathBuf],
    outputs: &[PathBuf],
    extensions: &SupportedExtensions,
    expand_directories: bool,
) -> Result<Vec<Job>> {
    let inputs = if expand_directories {
        expand_inputs(inputs)?
    } else {
        inputs.to_vec()
    };

    let mut jobs = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        extensions.check_input(&input)?;
        let output = match outputs.get(index) {
            Some(output) => output.clone(),
            None => synthesize_output(&input, extensions.default_output()),
        };
        extensions.check_output(&output)?;

        jobs.push(Job {
            input: absolute(&input)?,
            output: absolute(&output)?,
        });
    }
    Ok(jobs)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}
