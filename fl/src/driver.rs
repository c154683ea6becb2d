//! The batch command driver.
//!
//! Every file-processing command (parse, run, pack, unpack) implements
//! [`BatchCommand`] and is sequenced the same way:
//!
//! 1. initialize the [`FlContext`]
//! 2. `before_run`
//! 3. resolve the job list (directory expansion, extension checks, output
//!    synthesis); a bad extension anywhere rejects the batch before any job
//!    runs
//! 4. `run_job` for every job, in order
//! 5. `after_run`, which also runs when a job failed
//!
//! A job failing with [`FlError::MissingEntryPoint`] is skipped; any other
//! error ends the batch.

use anyhow::Result;
use clap::Args;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::backend::CheckProfile;
use crate::context::{FlContext, InitOptions};
use crate::error::{FlError, job_local_cause};
use crate::resolve::{Job, SupportedExtensions, resolve_jobs};

/// Flags shared by every batch command.
#[derive(Debug, Clone, Args)]
pub struct BatchArgs {
    /// Input files or directories
    #[arg(short, long = "input", num_args = 1.., value_name = "PATH")]
    pub input: Vec<PathBuf>,

    /// Output paths, paired with inputs by position
    #[arg(short, long = "output", num_args = 1.., value_name = "PATH")]
    pub output: Vec<PathBuf>,

    /// Answer yes to every confirmation dialog
    #[arg(long)]
    pub yes: bool,

    /// Log verbosity (0 = warnings only, 3 = trace)
    #[arg(short, long, default_value_t = 1)]
    pub verbosity: u8,

    /// Checks applied to every parsed program
    #[arg(long, value_enum, default_value_t = CheckProfile::default())]
    pub checks: CheckProfile,
}

impl BatchArgs {
    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            checks: self.checks,
            assume_yes: self.yes,
        }
    }
}

/// A command the driver can run over a list of jobs.
pub trait BatchCommand {
    /// Tag used in progress lines.
    fn name(&self) -> &'static str;

    fn extensions(&self) -> SupportedExtensions;

    /// Whether extension-less inputs expand to the programs below them.
    fn expand_input_directories(&self) -> bool {
        false
    }

    fn before_run(&mut self, _ctx: &FlContext) -> Result<()> {
        Ok(())
    }

    fn run_job(&mut self, ctx: &FlContext, job: &Job) -> Result<()>;

    fn after_run(&mut self, _ctx: &FlContext) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Created,
    Initializing,
    Validating,
    Dispatching,
    Completed,
    Skipped,
    Draining,
    Terminated,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Created => "created",
            DriverState::Initializing => "initializing",
            DriverState::Validating => "validating",
            DriverState::Dispatching => "dispatching",
            DriverState::Completed => "completed",
            DriverState::Skipped => "skipped",
            DriverState::Draining => "draining",
            DriverState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Skipped { reason: String },
}

/// What happened to each job, in dispatch order.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub jobs: Vec<(Job, JobOutcome)>,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|(_, o)| *o == JobOutcome::Completed)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.jobs.len() - self.completed()
    }
}

/// Emit a `[tag][Progress][current/total] message` line.
pub fn report_progress(tag: &str, current: usize, total: usize, message: impl fmt::Display) {
    info!("[{tag}][Progress][{current}/{total}] {message}");
}

pub struct Driver {
    state: DriverState,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    pub fn new() -> Self {
        Self {
            state: DriverState::Created,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    fn transition(&mut self, next: DriverState) {
        debug!(from = %self.state, to = %next, "driver");
        self.state = next;
    }

    /// Initialize the context and run `command` over the batch.
    pub fn run(&mut self, args: &BatchArgs, command: &mut dyn BatchCommand) -> Result<BatchSummary> {
        self.transition(DriverState::Initializing);
        let ctx = FlContext::initialize(&args.init_options())?;
        self.execute_with(&ctx, args, command)
    }

    /// Run `command` over the batch with an existing context.
    pub fn execute_with(
        &mut self,
        ctx: &FlContext,
        args: &BatchArgs,
        command: &mut dyn BatchCommand,
    ) -> Result<BatchSummary> {
        let tag = command.name();
        command.before_run(ctx)?;

        let result = self.dispatch(ctx, args, command);

        self.transition(DriverState::Draining);
        let drained = command.after_run(ctx);
        self.transition(DriverState::Terminated);

        match (result, drained) {
            (Ok(summary), Ok(())) => {
                info!(
                    "[{tag}] Finished: {} completed, {} skipped",
                    summary.completed(),
                    summary.skipped()
                );
                Ok(summary)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), drained) => {
                if let Err(drain_err) = drained {
                    error!("[{tag}] Shutdown after failure also failed: {drain_err:#}");
                }
                Err(e)
            }
        }
    }

    fn dispatch(
        &mut self,
        ctx: &FlContext,
        args: &BatchArgs,
        command: &mut dyn BatchCommand,
    ) -> Result<BatchSummary> {
        let tag = command.name();

        self.transition(DriverState::Validating);
        let jobs = resolve_jobs(
            &args.input,
            &args.output,
            &command.extensions(),
            command.expand_input_directories(),
        )?;
        if jobs.is_empty() {
            warn!("[{tag}] Nothing to do: no inputs");
        }

        let total = jobs.len();
        let mut summary = BatchSummary::default();
        for (index, job) in jobs.into_iter().enumerate() {
            self.transition(DriverState::Validating);
            report_progress(
                tag,
                index + 1,
                total,
                format_args!("{} => {}", job.input.display(), job.output.display()),
            );

            self.transition(DriverState::Dispatching);
            let outcome = match command.run_job(ctx, &job) {
                Ok(()) => JobOutcome::Completed,
                Err(err) => match job_local_cause(&err) {
                    Some(cause) => {
                        warn!("[{tag}] Skipping {}: {cause}", job.input.display());
                        JobOutcome::Skipped {
                            reason: cause.to_string(),
                        }
                    }
                    None => return Err(err),
                },
            };
            self.transition(match outcome {
                JobOutcome::Completed => DriverState::Completed,
                JobOutcome::Skipped { .. } => DriverState::Skipped,
            });
            summary.jobs.push((job, outcome));
        }
        Ok(summary)
    }
}
