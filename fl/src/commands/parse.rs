//! `fl parse`: compile program sources to `.flc`.

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::context::FlContext;
use crate::driver::{BatchArgs, BatchCommand, Driver};
use crate::resolve::{Job, SupportedExtensions};

#[derive(Debug, Args)]
pub struct ParseArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Define tags enabled while parsing
    #[arg(short, long, num_args = 1.., value_name = "TAG")]
    pub defines: Vec<String>,

    /// Extra serialization steps (prune, strip-defines)
    #[arg(short, long, num_args = 1.., value_name = "STEP")]
    pub extra_steps: Vec<String>,
}

pub struct ParseCommand {
    defines: Vec<String>,
    extra_steps: Vec<String>,
}

impl ParseCommand {
    pub fn new(defines: Vec<String>, extra_steps: Vec<String>) -> Self {
        Self {
            defines,
            extra_steps,
        }
    }
}

impl BatchCommand for ParseCommand {
    fn name(&self) -> &'static str {
        "parse"
    }

    fn extensions(&self) -> SupportedExtensions {
        SupportedExtensions::new(&["fl"], &["flc"])
    }

    fn run_job(&mut self, ctx: &FlContext, job: &Job) -> Result<()> {
        let program = ctx.parse_program(&job.input, &self.defines)?;
        ctx.save_program(&program, &self.extra_steps, &job.output)?;
        info!("[parse] Wrote {}", job.output.display());
        Ok(())
    }
}

pub fn run(args: ParseArgs) -> Result<()> {
    let mut command = ParseCommand::new(args.defines, args.extra_steps);
    Driver::new().run(&args.batch, &mut command)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CheckProfile;
    use crate::context::test_support::context_in;
    use std::fs;

    #[test]
    fn source_compiles_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_in(dir.path(), CheckProfile::default());
        let source = dir.path().join("a.fl");
        fs::write(&source, "Main:\n  ?FAST set_v 1\n  invert\n").unwrap();

        let args = BatchArgs {
            input: vec![source],
            output: Vec::new(),
            yes: true,
            verbosity: 1,
            checks: CheckProfile::default(),
        };
        let mut command = ParseCommand::new(vec!["FAST".into()], vec!["strip-defines".into()]);
        Driver::new().execute_with(&ctx, &args, &mut command).unwrap();

        let compiled = ctx.load_program(&dir.path().join("a.flc"), &[]).unwrap();
        assert_eq!(compiled.functions[0].instructions.len(), 2);
        assert!(compiled.defines.is_empty());
    }
}
