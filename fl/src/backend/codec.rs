//! Compiled program format (`.flc`).
//!
//! A `.flc` file is gzip'd JSON holding the parsed [`Program`] and the extra
//! serialization steps that were applied to it.

use anyhow::{Context, Result, bail};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use super::program::Program;

const FORMAT: &str = "flc";
const FORMAT_VERSION: u32 = 1;

/// Steps accepted by `--extra-steps`.
pub const EXTRA_STEPS: &[&str] = &["prune", "strip-defines"];

/// Serializes parsed programs and loads them back.
pub trait ProgramCodec: Send + Sync {
    fn save(&self, program: &Program, extra_steps: &[String], dest: &Path) -> Result<()>;

    fn load(&self, path: &Path) -> Result<Program>;
}

#[derive(Serialize, Deserialize)]
struct FlcFile {
    format: String,
    version: u32,
    #[serde(default)]
    extra_steps: Vec<String>,
    program: Program,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FlcCodec;

impl FlcCodec {
    fn apply_steps(program: &mut Program, extra_steps: &[String]) -> Result<()> {
        for step in extra_steps {
            match step.as_str() {
                "prune" => {
                    let removed = program.prune_unreachable();
                    debug!(program = %program.name, removed, "prune");
                }
                "strip-defines" => program.defines.clear(),
                other => bail!(
                    "Unknown extra step '{other}' (known: {})",
                    EXTRA_STEPS.join(", ")
                ),
            }
        }
        Ok(())
    }
}

impl ProgramCodec for FlcCodec {
    fn save(&self, program: &Program, extra_steps: &[String], dest: &Path) -> Result<()> {
        let mut program = program.clone();
        Self::apply_steps(&mut program, extra_steps)?;

        let file = FlcFile {
            format: FORMAT.to_string(),
            version: FORMAT_VERSION,
            extra_steps: extra_steps.to_vec(),
            program,
        };
        let json = serde_json::to_vec(&file).context("Failed to serialize program")?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let out = fs::File::create(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut encoder = GzEncoder::new(out, Compression::default());
        encoder
            .write_all(&json)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        encoder
            .finish()
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Program> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut json = Vec::new();
        GzDecoder::new(file)
            .read_to_end(&mut json)
            .with_context(|| format!("{} is not a compiled program", path.display()))?;
        let flc: FlcFile = serde_json::from_slice(&json)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if flc.format != FORMAT || flc.version != FORMAT_VERSION {
            bail!(
                "{}: unsupported format {} v{}",
                path.display(),
                flc.format,
                flc.version
            );
        }
        Ok(flc.program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::program::{Function, Instruction};

    fn sample() -> Program {
        let func = |name: &str, call: Option<&str>| Function {
            name: name.into(),
            instructions: call
                .map(|target| Instruction {
                    name: "call".into(),
                    args: vec![target.into()],
                })
                .into_iter()
                .collect(),
        };
        Program {
            name: "sample".into(),
            defines: vec!["NOISE".into()],
            functions: vec![func("Main", Some("A")), func("A", None), func("Dead", None)],
        }
    }

    #[test]
    fn saved_program_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out/sample.flc");
        FlcCodec.save(&sample(), &[], &dest).unwrap();
        assert_eq!(FlcCodec.load(&dest).unwrap(), sample());
    }

    #[test]
    fn extra_steps_are_applied_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sample.flc");
        let steps = vec!["prune".to_string(), "strip-defines".to_string()];
        FlcCodec.save(&sample(), &steps, &dest).unwrap();

        let loaded = FlcCodec.load(&dest).unwrap();
        assert!(loaded.defines.is_empty());
        assert!(loaded.function("Dead").is_none());
    }

    #[test]
    fn unknown_extra_step_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = FlcCodec
            .save(&sample(), &["inline".into()], &dir.path().join("x.flc"))
            .unwrap_err();
        assert!(err.to_string().contains("inline"));
    }

    #[test]
    fn plain_text_is_not_a_compiled_program() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.flc");
        fs::write(&path, "Main:\n").unwrap();
        assert!(FlcCodec.load(&path).is_err());
    }
}
