//! `fl run`: execute programs and write the resulting images.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::backend::MAX_DIMENSION;
use crate::context::FlContext;
use crate::driver::{BatchArgs, BatchCommand, Driver};
use crate::pipeline::{FinalizationPipeline, SaveTask};
use crate::resolve::{Job, SupportedExtensions};

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Define tags enabled while parsing sources
    #[arg(short, long, num_args = 1.., value_name = "TAG")]
    pub defines: Vec<String>,

    /// Zero the input buffer before running
    #[arg(short, long)]
    pub warm: bool,

    /// Width of the input buffer [default: from config, 256]
    #[arg(
        short = 'x',
        long = "x",
        value_name = "PIXELS",
        value_parser = clap::value_parser!(u32).range(1..=MAX_DIMENSION as i64)
    )]
    pub width: Option<u32>,

    /// Height of the input buffer [default: from config, 256]
    #[arg(
        short = 'y',
        long = "y",
        value_name = "PIXELS",
        value_parser = clap::value_parser!(u32).range(1..=MAX_DIMENSION as i64)
    )]
    pub height: Option<u32>,

    /// Write images on N background threads (bare flag: 1, 0: inline)
    #[arg(
        long,
        value_name = "N",
        num_args = 0..=1,
        default_value_t = 0,
        default_missing_value = "1"
    )]
    pub use_save_thread: usize,
}

pub struct RunCommand {
    defines: Vec<String>,
    warm: bool,
    width: Option<u32>,
    height: Option<u32>,
    save_threads: usize,
    pipeline: Option<FinalizationPipeline>,
}

impl RunCommand {
    pub fn new(args: &RunArgs) -> Self {
        Self {
            defines: args.defines.clone(),
            warm: args.warm,
            width: args.width,
            height: args.height,
            save_threads: args.use_save_thread,
            pipeline: None,
        }
    }
}

impl BatchCommand for RunCommand {
    fn name(&self) -> &'static str {
        "run"
    }

    fn extensions(&self) -> SupportedExtensions {
        SupportedExtensions::new(&["fl", "flc"], &["png", "bmp"])
    }

    fn expand_input_directories(&self) -> bool {
        true
    }

    fn before_run(&mut self, ctx: &FlContext) -> Result<()> {
        if self.save_threads > 0 {
            let pipeline = FinalizationPipeline::start(
                self.save_threads,
                Arc::clone(&ctx.sink),
                Duration::from_millis(ctx.config.save_poll_interval_ms),
            )?;
            info!("[run] Saving on {} background thread(s)", pipeline.worker_count());
            self.pipeline = Some(pipeline);
        }
        Ok(())
    }

    fn run_job(&mut self, ctx: &FlContext, job: &Job) -> Result<()> {
        let program = ctx.load_program(&job.input, &self.defines)?;
        let width = self.width.unwrap_or(ctx.config.resolution.width);
        let height = self.height.unwrap_or(ctx.config.resolution.height);

        let output = ctx.render(&program, width, height, self.warm)?;
        match &self.pipeline {
            Some(pipeline) => pipeline.enqueue(SaveTask {
                image: output,
                device: Arc::clone(&ctx.device),
                source: job.input.clone(),
                dest: job.output.clone(),
            }),
            None => {
                ctx.write_image(&output, &job.output)?;
                info!("[run] Saved {}", job.output.display());
            }
        }
        Ok(())
    }

    fn after_run(&mut self, _ctx: &FlContext) -> Result<()> {
        if let Some(pipeline) = self.pipeline.take() {
            info!("[run] Waiting for queued images");
            let stats = pipeline.shutdown()?;
            info!(
                "[run] Saved {} of {} image(s) ({} skipped, {} failed)",
                stats.consumed, stats.produced, stats.skipped, stats.failed
            );
        }
        Ok(())
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    let mut command = RunCommand::new(&args);
    Driver::new().run(&args.batch, &mut command)?;
    Ok(())
}
