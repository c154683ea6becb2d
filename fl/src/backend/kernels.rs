//! Kernel discovery at startup.
//!
//! Every `*.cl` file in the kernel directory is handed to the device for
//! compilation. A file that fails to compile is logged and recorded in the
//! report; only a directory that yields no kernels at all is fatal.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::ComputeDevice;
use super::program::CALL_INSTRUCTION;
use crate::error::FlError;

/// Names of all instructions a program may use.
#[derive(Debug, Clone, Default)]
pub struct InstructionSet {
    kernels: BTreeSet<String>,
}

impl InstructionSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kernels: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Kernel names or the built-in `call`.
    pub fn contains(&self, name: &str) -> bool {
        name == CALL_INSTRUCTION || self.kernels.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn kernels(&self) -> impl Iterator<Item = &str> {
        self.kernels.iter().map(String::as_str)
    }
}

/// A kernel file that did not compile.
#[derive(Debug, Clone)]
pub struct KernelFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of kernel discovery.
#[derive(Debug, Clone, Default)]
pub struct KernelReport {
    pub directory: PathBuf,
    pub files: usize,
    pub failures: Vec<KernelFailure>,
}

/// Compile every kernel file in `dir` and build the instruction set.
pub fn discover(device: &dyn ComputeDevice, dir: &Path) -> Result<(InstructionSet, KernelReport)> {
    info!("[CL-KERNELS] Discovering files in path: {}", dir.display());

    let files = kernel_files(dir)?;
    if files.is_empty() {
        error!("[CL-KERNELS] No files found at path: {}", dir.display());
    }

    let mut kernels = BTreeSet::new();
    let mut report = KernelReport {
        directory: dir.to_path_buf(),
        files: files.len(),
        failures: Vec::new(),
    };

    for (index, file) in files.iter().enumerate() {
        debug!(
            "[CL-KERNELS][{}/{}] Loading: {} ({})",
            index,
            files.len(),
            file.display(),
            kernels.len()
        );

        let compiled = fs::read_to_string(file)
            .with_context(|| format!("Failed to read kernel file {}", file.display()))
            .and_then(|source| device.compile_kernels(file, &source));

        match compiled {
            Ok(names) => kernels.extend(names),
            Err(err) => {
                error!("[CL-KERNELS] ERROR: {}: {:#}", file.display(), err);
                report.failures.push(KernelFailure {
                    path: file.clone(),
                    message: format!("{err:#}"),
                });
            }
        }
    }

    info!("[CL-KERNELS] Kernels loaded: {}", kernels.len());

    if kernels.is_empty() {
        return Err(FlError::NoKernels {
            path: dir.to_path_buf(),
        }
        .into());
    }

    Ok((InstructionSet { kernels }, report))
}

/// `*.cl` files directly inside `dir`, sorted by name.
fn kernel_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read kernel directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "cl") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::HostDevice;

    #[test]
    fn broken_file_is_recorded_but_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("good.cl"),
            "__kernel void set_v(__global uchar* image, float v) { }",
        )
        .unwrap();
        fs::write(dir.path().join("broken.cl"), "__kernel void invert( {").unwrap();

        let (iset, report) = discover(&HostDevice::new(), dir.path()).unwrap();
        assert!(iset.contains("set_v"));
        assert!(!iset.contains("invert"));
        assert_eq!(report.files, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("broken.cl"));
    }

    #[test]
    fn empty_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&HostDevice::new(), dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlError>(),
            Some(FlError::NoKernels { .. })
        ));
    }

    #[test]
    fn call_is_always_available() {
        let iset = InstructionSet::default();
        assert!(iset.contains("call"));
        assert!(iset.is_empty());
    }
}
