//! Error types the driver recognises by kind.
//!
//! Everything else travels as `anyhow::Error` with context attached at the
//! I/O boundary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlError {
    /// An input or output path has an extension the command does not accept.
    /// Fatal for the whole batch.
    #[error("Extension is not supported: '{extension}' ({path}); expected one of: {expected}")]
    UnsupportedExtension {
        extension: String,
        path: PathBuf,
        expected: String,
    },

    /// The program has no executable entry point. The job is skipped.
    #[error("No entry point '{entry}' found in {program}")]
    MissingEntryPoint { program: String, entry: String },

    /// The compute device could not provide a single kernel.
    #[error("No executable kernels found in {path}")]
    NoKernels { path: PathBuf },

    /// The selected program check profile could not be attached to the parser.
    #[error("Check profile '{profile}' contains invalid checks: {reason}")]
    InvalidCheckProfile { profile: String, reason: String },

    /// An instruction references a kernel the instruction set does not know.
    #[error("Unknown instruction '{name}' in function '{function}'")]
    UnknownInstruction { name: String, function: String },

    /// A buffer size is zero or larger than the device supports.
    #[error("Invalid buffer size {width}x{height}: each side must be between 1 and {max}")]
    InvalidResolution { width: u32, height: u32, max: u32 },

    /// A directory input to expand does not exist.
    #[error("Input directory not found: {path}")]
    InputDirectoryNotFound { path: PathBuf },
}

impl FlError {
    /// True for the job-local condition that skips a job instead of failing
    /// the batch.
    pub fn is_job_local(&self) -> bool {
        matches!(self, FlError::MissingEntryPoint { .. })
    }
}

/// Find a job-local [`FlError`] anywhere in an error chain.
pub fn job_local_cause(err: &anyhow::Error) -> Option<&FlError> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<FlError>())
        .find(|e| e.is_job_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn missing_entry_point_is_job_local_through_context() {
        let err: anyhow::Result<()> = Err(FlError::MissingEntryPoint {
            program: "a.fl".into(),
            entry: "Main".into(),
        })
        .context("running a.fl");
        let err = err.unwrap_err();
        assert!(job_local_cause(&err).is_some());
    }

    #[test]
    fn unsupported_extension_is_not_job_local() {
        let err = anyhow::Error::new(FlError::UnsupportedExtension {
            extension: ".txt".into(),
            path: "/a.txt".into(),
            expected: ".fl".into(),
        });
        assert!(job_local_cause(&err).is_none());
    }
}
